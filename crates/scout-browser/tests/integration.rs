//! Integration tests for scout-browser
//!
//! These tests require Chrome to be installed and available.
//! Run with: cargo test -p scout-browser --test integration -- --ignored

use scout_browser::{Condition, Driver, EokaDriver, LaunchOptions, Target};

fn headless() -> LaunchOptions {
    LaunchOptions {
        headless: true,
        ..Default::default()
    }
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_select_address_from_dropdown() {
    let driver = EokaDriver::launch(&headless())
        .await
        .expect("Failed to launch browser");

    driver
        .navigate(
            r##"data:text/html,
            <input id="postcode" type="text">
            <select id="address-select">
              <option>Select your address</option>
              <option>Flat 2, 10 Main St</option>
              <option>10 Main St</option>
            </select>
            <p>Enter your postcode</p>
        "##,
        )
        .await
        .expect("Failed to navigate");

    let select = driver
        .find(&Target::selector("#address-select"))
        .await
        .unwrap()
        .expect("select should exist");
    let options = driver.option_texts(&select).await.unwrap();
    assert_eq!(options.len(), 3);
    assert_eq!(options[2], "10 Main St");

    driver.select_by_index(&select, 2).await.unwrap();
    assert!(driver
        .wait_for(&Condition::TextContains("enter your postcode".into()), 1_000)
        .await
        .unwrap());

    let input = driver
        .find(&Target::selector("#postcode"))
        .await
        .unwrap()
        .expect("input should exist");
    driver.type_text(&input, "IP4 5ET").await.unwrap();

    assert!(driver
        .find(&Target::selector("#missing"))
        .await
        .unwrap()
        .is_none());

    driver.close().await.expect("Failed to close browser");
    assert!(driver.current_url().await.is_err());
}
