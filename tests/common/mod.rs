//! A scripted quote site behind the `Driver` trait.
//!
//! Pages: postcode form -> address list -> fuel choice -> quote -> details.
//! Per-address notices and per-session blocks are configured up front.

#![allow(dead_code)]

use async_trait::async_trait;
use scout_browser::{Condition, Driver, ElementHandle, Error, Result, SessionFactory, Target};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tariff_scout::{Config, Supplier};

pub const DETAILS: &str = "Fixed Tariff Dec26 v3\n\
    Electricity tariff costs\n\
    Unit rate 24.50 p per kWh\n\
    Standing charge 53.35 p per day\n\
    Gas tariff costs\n\
    Unit rate 6.10 p per kWh\n\
    Standing charge 31.65 p per day\n\
    Exit fee: £75 per fuel\n\
    Contract length 12 months";

pub const PROFILE: &str = r##"
name: "test_supplier"
url: "https://quotes.example.com/start"
output_prefix: "test_tariffs"
regions:
  - region: "Eastern"
    postcode: "IP4 5ET"
  - region: "London"
    postcode: "N5 2SD"
address:
  max_candidates: 3
journey:
  timeout_ms: 2000
  poll_ms: 100
  dismiss:
    - selector: "#cookie-accept"
  postcode:
    input:
      selector: "#postcode"
    actions:
      - press_key:
          key: "Enter"
    milestone:
      selector: "#address"
  address:
    select:
      selector: "#address"
    actions:
      - click:
          text: "Choose this address"
          timeout_ms: 500
          or_next_address: true
    milestone:
      text_contains: "What fuel do you need?"
  service:
    actions:
      - click:
          text: "Gas & electricity"
    milestone:
      text_contains: "See tariff details"
  tariff:
    actions:
      - click:
          text: "See tariff details"
    milestone:
      text_contains: "Gas tariff costs"
retry:
  max_attempts: 3
  base_secs: 30
  jitter_secs: 10
batch:
  region_wait_secs: 20
"##;

pub fn supplier(extra: &str) -> Supplier {
    let yaml = format!("{}{}", PROFILE, extra);
    Supplier::new(Config::parse(&yaml).expect("profile parses")).expect("profile compiles")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Postcode,
    Addresses,
    Fuel,
    Quote,
    Details,
    Blocked,
}

/// How the site behaves.
#[derive(Debug, Clone)]
pub struct Site {
    pub options: Vec<String>,
    /// Notice shown after selecting an address.
    pub notices: HashMap<usize, String>,
    /// Notice shown on the quote page for an address.
    pub late_notices: HashMap<usize, String>,
    /// Addresses for which the confirm button never appears.
    pub no_button: HashSet<usize>,
    /// Text shown instead of the form for the first N sessions.
    pub block_text: String,
    pub blocked_sessions: u32,
    /// The fuel choice never leads anywhere.
    pub stuck_at_fuel: bool,
    pub details: String,
    pub cookie_banner: bool,
}

impl Default for Site {
    fn default() -> Self {
        Self {
            options: vec![
                "Select an address".into(),
                "Flat 1, 2 High Street".into(),
                "2 High Street".into(),
                "4 High Street".into(),
                "6 High Street".into(),
            ],
            notices: HashMap::new(),
            late_notices: HashMap::new(),
            no_button: HashSet::new(),
            block_text: "Too many requests. Please try again later.".into(),
            blocked_sessions: 0,
            stuck_at_fuel: false,
            details: DETAILS.into(),
            cookie_banner: true,
        }
    }
}

/// What happened across every session.
#[derive(Debug, Default)]
pub struct Log {
    pub selected: Vec<usize>,
    pub typed: Vec<String>,
    pub navigations: u32,
    pub screenshots: u32,
    pub closed: u32,
    pub cookie_clicks: u32,
}

struct PageState {
    page: Page,
    selected: Option<usize>,
    typed: Option<String>,
    cookie_banner: bool,
    closed: bool,
}

pub struct FakeDriver {
    site: Site,
    blocked: bool,
    state: Mutex<PageState>,
    log: Arc<Mutex<Log>>,
}

impl FakeDriver {
    pub fn new(site: Site, blocked: bool, log: Arc<Mutex<Log>>) -> Self {
        let cookie_banner = site.cookie_banner;
        Self {
            site,
            blocked,
            state: Mutex::new(PageState {
                page: Page::Postcode,
                selected: None,
                typed: None,
                cookie_banner,
                closed: false,
            }),
            log,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut PageState) -> T) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::Closed);
        }
        Ok(f(&mut state))
    }

    fn notice(&self, state: &PageState) -> Option<&str> {
        state
            .selected
            .and_then(|i| self.site.notices.get(&i))
            .map(String::as_str)
    }

    fn visible(&self, state: &PageState, target: &Target) -> bool {
        if let Some(ref selector) = target.selector {
            return match selector.as_str() {
                "#cookie-accept" => state.cookie_banner,
                "#postcode" => state.page == Page::Postcode,
                "#address" => state.page == Page::Addresses,
                _ => false,
            };
        }
        let Some(ref text) = target.text else {
            return false;
        };
        match (state.page, text.as_str()) {
            (Page::Addresses, "Choose this address") => state
                .selected
                .is_some_and(|i| !self.site.no_button.contains(&i)),
            (Page::Fuel, "Gas & electricity") => true,
            (Page::Quote, "See tariff details") => true,
            _ => false,
        }
    }
}

fn handle_for(target: &Target) -> ElementHandle {
    match (&target.selector, &target.text) {
        (Some(s), _) => ElementHandle::new(s.clone()),
        (_, Some(t)) => ElementHandle::new(format!("text={}", t)),
        _ => ElementHandle::new(""),
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn navigate(&self, _url: &str) -> Result<()> {
        self.log.lock().unwrap().navigations += 1;
        let blocked = self.blocked;
        self.with_state(|s| {
            s.page = if blocked { Page::Blocked } else { Page::Postcode };
            s.selected = None;
            s.typed = None;
        })
    }

    async fn find(&self, target: &Target) -> Result<Option<ElementHandle>> {
        self.with_state(|s| self.visible(s, target).then(|| handle_for(target)))
    }

    async fn read_text(&self, _scope: &str) -> Result<String> {
        self.with_state(|s| {
            let base = match s.page {
                Page::Postcode => "Get a quote. Enter your postcode".to_string(),
                Page::Addresses => "Select your address".to_string(),
                Page::Fuel => "What fuel do you need?".to_string(),
                Page::Quote => "Your quote is ready. See tariff details".to_string(),
                Page::Details => self.site.details.clone(),
                Page::Blocked => self.site.block_text.clone(),
            };
            let late = s.selected.and_then(|i| self.site.late_notices.get(&i));
            match (s.page, self.notice(s), late) {
                (Page::Addresses, Some(notice), _) => format!("{}\n{}", base, notice),
                (Page::Quote, _, Some(notice)) => format!("{}\n{}", base, notice),
                _ => base,
            }
        })
    }

    async fn current_url(&self) -> Result<String> {
        Ok("https://quotes.example.com/start".to_string())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<()> {
        if element.selector() == "#postcode" {
            self.log.lock().unwrap().typed.push(text.to_string());
        }
        self.with_state(|s| s.typed = Some(text.to_string()))
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let stuck = self.site.stuck_at_fuel;
        let cookie = element.selector() == "#cookie-accept";
        if cookie {
            self.log.lock().unwrap().cookie_clicks += 1;
        }
        self.with_state(|s| {
            if cookie {
                s.cookie_banner = false;
                return;
            }
            let has_notice = self.notice(s).is_some();
            match (s.page, element.selector()) {
                (Page::Addresses, "text=Choose this address") if !has_notice => s.page = Page::Fuel,
                (Page::Fuel, "text=Gas & electricity") if !stuck => s.page = Page::Quote,
                (Page::Quote, "text=See tariff details") => s.page = Page::Details,
                _ => {}
            }
        })
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.with_state(|s| {
            if key == "Enter" && s.page == Page::Postcode && s.typed.is_some() {
                s.page = Page::Addresses;
            }
        })
    }

    async fn select_by_index(&self, element: &ElementHandle, index: usize) -> Result<()> {
        if element.selector() != "#address" {
            return Err(Error::ElementNotFound(element.selector().to_string()));
        }
        if index >= self.site.options.len() {
            return Err(Error::Script("option_not_found".into()));
        }
        self.log.lock().unwrap().selected.push(index);
        self.with_state(|s| s.selected = Some(index))
    }

    async fn option_texts(&self, _element: &ElementHandle) -> Result<Vec<String>> {
        let options = self.site.options.clone();
        self.with_state(|_| options)
    }

    async fn screenshot(&self, _path: &Path) -> Result<()> {
        self.log.lock().unwrap().screenshots += 1;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.lock().unwrap().closed += 1;
        self.with_state(|s| s.closed = true)
    }

    async fn check(&self, condition: &Condition) -> Result<bool> {
        match condition {
            Condition::Selector(selector) => {
                Ok(self.find(&Target::selector(selector)).await?.is_some())
            }
            _ => {
                let text = self.read_text("body").await?.to_lowercase();
                Ok(condition.matches_text(&text).unwrap_or(false))
            }
        }
    }
}

/// Opens `FakeDriver` sessions; the first `site.blocked_sessions` are blocked.
pub struct FakeSessions {
    pub site: Site,
    pub opened: AtomicU32,
    pub log: Arc<Mutex<Log>>,
}

impl FakeSessions {
    pub fn new(site: Site) -> Self {
        Self {
            site,
            opened: AtomicU32::new(0),
            log: Arc::new(Mutex::new(Log::default())),
        }
    }

    pub fn driver(&self) -> FakeDriver {
        FakeDriver::new(self.site.clone(), false, self.log.clone())
    }

    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeSessions {
    async fn open(&self) -> Result<Box<dyn Driver>> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst);
        let blocked = n < self.site.blocked_sessions;
        Ok(Box::new(FakeDriver::new(
            self.site.clone(),
            blocked,
            self.log.clone(),
        )))
    }
}
