//! One attempt at a quote journey.
//!
//! The loop below performs each step's side effects through the [`Driver`],
//! waits for the step's milestone or a blocker, and feeds what it saw into
//! [`AttemptState`]. It never decides where to go next itself.

mod error;
mod state;

pub use error::{FailureKind, JourneyError};
pub use state::{AttemptState, BlockReason, JourneyState, Observation, Step};

use crate::address;
use crate::config::{StepAction, StepConfig};
use crate::extract::TariffQuote;
use crate::Supplier;
use scout_browser::{Condition, Driver, ElementHandle, Target};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

type StepResult<T> = std::result::Result<T, JourneyError>;

/// Outcome of one attempt.
#[derive(Debug)]
pub struct AttemptReport {
    pub outcome: StepResult<Vec<TariffQuote>>,
    /// Address candidates used before the attempt ended.
    pub address_attempts: usize,
}

/// Run one attempt for `postcode` on an already-open session.
pub async fn run_attempt(
    supplier: &Supplier,
    driver: &dyn Driver,
    postcode: &str,
    attempt: u32,
) -> AttemptReport {
    let mut journey = Journey {
        supplier,
        driver,
        postcode,
        state: AttemptState::new(attempt, supplier.config.address.max_candidates),
    };
    let outcome = journey.run().await;
    AttemptReport {
        outcome,
        address_attempts: journey.state.address_attempts(),
    }
}

struct Journey<'a> {
    supplier: &'a Supplier,
    driver: &'a dyn Driver,
    postcode: &'a str,
    state: AttemptState,
}

impl<'a> Journey<'a> {
    async fn run(&mut self) -> StepResult<Vec<TariffQuote>> {
        let supplier = self.supplier;
        let journey = &supplier.config.journey;

        info!("Navigating to: {}", supplier.config.url);
        self.driver.navigate(&supplier.config.url).await?;

        loop {
            match self.state.state() {
                JourneyState::Init => {
                    let observation = self.enter_postcode().await?;
                    self.apply(Step::Postcode, observation);
                }
                JourneyState::PostcodeEntered => {
                    if self.state.needs_candidates() {
                        if let Some(observation) = self.load_candidates().await? {
                            self.apply(Step::Address, observation);
                            continue;
                        }
                    }
                    self.state.advance_address();
                }
                JourneyState::AddressSelected if self.state.awaiting_confirmation() => {
                    let observation = self.confirm_address().await?;
                    self.apply(Step::Address, observation);
                }
                JourneyState::AddressSelected => {
                    let observation = self.step(&journey.service, Step::Service).await?;
                    self.apply(Step::Service, observation);
                }
                JourneyState::ServiceConfigured => {
                    let observation = self.step(&journey.proceed, Step::Proceed).await?;
                    self.apply(Step::Proceed, observation);
                }
                JourneyState::ContinuedToListing => {
                    let observation = self.step(&journey.tariff, Step::Tariff).await?;
                    self.apply(Step::Tariff, observation);
                }
                JourneyState::TariffSelected | JourneyState::DetailsExtracted => {
                    return self.extract().await;
                }
                JourneyState::Blocked(reason) => return Err(reason.into()),
                JourneyState::Exhausted => {
                    return Err(JourneyError::Exhausted {
                        tried: self.state.address_attempts(),
                    })
                }
            }
        }
    }

    fn apply(&mut self, step: Step, observation: Observation) {
        match observation {
            Observation::Milestone => debug!("{} step done", step),
            Observation::Blocker(kind) => warn!("Blocker at {} step: {}", step, kind),
            Observation::AddressIneligible => warn!("Address not eligible at {} step", step),
            Observation::Timeout(_) => warn!("Timed out at {} step", step),
        }
        let next = self.state.observe(observation);
        if next == JourneyState::AddressSelected && self.state.awaiting_confirmation() {
            if let Some(c) = self.state.current() {
                info!("Moving on to address #{}: {}", c.index, c.raw_text);
            }
        }
    }

    async fn enter_postcode(&self) -> StepResult<Observation> {
        let journey = &self.supplier.config.journey;
        let postcode = &journey.postcode;
        let timeout = journey.timeout_for(&postcode.step);

        self.dismiss_overlays().await?;
        let Some(input) = self.wait_for_element(&postcode.input, timeout).await? else {
            return self.blocker_or(Observation::Timeout(Step::Postcode)).await;
        };
        debug!("Entering postcode {}", self.postcode);
        self.driver.type_text(&input, self.postcode).await?;
        self.perform(&postcode.step, Step::Postcode).await
    }

    /// Read the address list once per attempt.
    async fn load_candidates(&mut self) -> StepResult<Option<Observation>> {
        let supplier = self.supplier;
        let journey = &supplier.config.journey;
        let timeout = journey.timeout_for(&journey.address.step);

        let Some(select) = self.wait_for_element(&journey.address.select, timeout).await? else {
            return Ok(Some(
                self.blocker_or(Observation::Timeout(Step::Address)).await?,
            ));
        };
        let options = self.driver.option_texts(&select).await?;
        let start = supplier.config.start_index.for_postcode(self.postcode);
        let found = address::candidates(
            &options,
            start,
            self.state.tried(),
            &supplier.candidate_policy,
        );
        info!(
            "{} address options, {} candidates from index {}",
            options.len(),
            found.len(),
            start
        );
        self.state.load_candidates(found);
        Ok(None)
    }

    async fn confirm_address(&self) -> StepResult<Observation> {
        let journey = &self.supplier.config.journey;
        let address = &journey.address;
        let timeout = journey.timeout_for(&address.step);

        let Some(index) = self.state.current().map(|c| c.index) else {
            return Ok(Observation::Timeout(Step::Address));
        };

        self.dismiss_overlays().await?;
        let select = match self.driver.find(&address.select).await? {
            Some(select) => select,
            None => {
                // A rejected address usually leaves us past the address list.
                debug!("Address list gone, restarting from the postcode step");
                self.driver.navigate(&self.supplier.config.url).await?;
                let observation = self.enter_postcode().await?;
                if observation != Observation::Milestone {
                    return Ok(observation);
                }
                match self.wait_for_element(&address.select, timeout).await? {
                    Some(select) => select,
                    None => return self.blocker_or(Observation::Timeout(Step::Address)).await,
                }
            }
        };

        debug!("Selecting address option {}", index);
        self.driver.select_by_index(&select, index).await?;
        self.perform(&address.step, Step::Address).await
    }

    async fn step(&self, config: &StepConfig, step: Step) -> StepResult<Observation> {
        self.dismiss_overlays().await?;
        self.perform(config, step).await
    }

    /// Run a step's actions, then wait for its milestone.
    async fn perform(&self, config: &StepConfig, step: Step) -> StepResult<Observation> {
        let timeout = self.supplier.config.journey.timeout_for(config);

        for (i, action) in config.actions.iter().enumerate() {
            debug!("{} step action {}: {}", step, i + 1, action.name());
            if let Some(observation) = self.execute(action, step, timeout).await? {
                return Ok(observation);
            }
        }

        match config.milestone {
            Some(ref milestone) => self.await_outcome(milestone, timeout, step).await,
            None => self.blocker_or(Observation::Milestone).await,
        }
    }

    /// `Some` when the action decided the step's outcome early.
    async fn execute(
        &self,
        action: &StepAction,
        step: Step,
        timeout: u64,
    ) -> StepResult<Option<Observation>> {
        match action {
            StepAction::Click(a) => {
                let wait = a.timeout_ms.unwrap_or(timeout);
                match self.wait_for_element(&a.target, wait).await? {
                    Some(element) => {
                        debug!("click: {}", a.target);
                        self.driver.click(&element).await?;
                    }
                    None => {
                        debug!("click target not found: {}", a.target);
                        let fallback = if a.or_next_address {
                            Observation::AddressIneligible
                        } else {
                            Observation::Timeout(step)
                        };
                        return Ok(Some(self.blocker_or(fallback).await?));
                    }
                }
            }
            StepAction::TryClick(target) => {
                if let Some(element) = self.driver.find(target).await? {
                    debug!("try_click: {}", target);
                    self.driver.click(&element).await?;
                }
            }
            StepAction::Fill(a) => match self.wait_for_element(&a.target, timeout).await? {
                Some(element) => {
                    debug!("fill: {}", a.target);
                    self.driver.type_text(&element, &a.value).await?;
                }
                None => {
                    return Ok(Some(
                        self.blocker_or(Observation::Timeout(step)).await?,
                    ))
                }
            },
            StepAction::PressKey(a) => {
                debug!("press_key: {}", a.key);
                self.driver.press_key(&a.key).await?;
            }
            StepAction::Wait(a) => {
                debug!("wait: {}ms", a.ms);
                tokio::time::sleep(Duration::from_millis(a.ms)).await;
            }
            StepAction::Dismiss => self.dismiss_overlays().await?,
        }
        Ok(None)
    }

    /// Poll until the milestone holds, a blocker shows, or time runs out.
    /// Blockers win over a milestone seen in the same poll.
    async fn await_outcome(
        &self,
        milestone: &Condition,
        timeout: u64,
        step: Step,
    ) -> StepResult<Observation> {
        let poll = Duration::from_millis(self.supplier.config.journey.poll_ms);
        let deadline = Instant::now() + Duration::from_millis(timeout);

        loop {
            let text = self.driver.read_text("body").await?.to_lowercase();
            if let Some(kind) = self.supplier.classifier.classify(&text) {
                return Ok(Observation::Blocker(kind));
            }

            let reached = match milestone.matches_text(&text) {
                Some(reached) => reached,
                None => self.driver.check(milestone).await?,
            };
            if reached {
                debug!("{} milestone reached: {}", step, milestone);
                return Ok(Observation::Milestone);
            }

            if Instant::now() >= deadline {
                return Ok(Observation::Timeout(step));
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// The blocker on the page right now, or `fallback`.
    async fn blocker_or(&self, fallback: Observation) -> StepResult<Observation> {
        let text = self.driver.read_text("body").await?.to_lowercase();
        Ok(self
            .supplier
            .classifier
            .classify(&text)
            .map(Observation::Blocker)
            .unwrap_or(fallback))
    }

    async fn wait_for_element(
        &self,
        target: &Target,
        timeout: u64,
    ) -> StepResult<Option<ElementHandle>> {
        let poll = Duration::from_millis(self.supplier.config.journey.poll_ms);
        let deadline = Instant::now() + Duration::from_millis(timeout);
        loop {
            if let Some(element) = self.driver.find(target).await? {
                return Ok(Some(element));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn dismiss_overlays(&self) -> StepResult<()> {
        for target in &self.supplier.config.journey.dismiss {
            if let Some(element) = self.driver.find(target).await? {
                debug!("dismiss: {}", target);
                if let Err(e) = self.driver.click(&element).await {
                    debug!("dismiss click failed: {}", e);
                }
            }
        }
        Ok(())
    }

    async fn extract(&mut self) -> StepResult<Vec<TariffQuote>> {
        let supplier = self.supplier;
        let text = self
            .driver
            .read_text(&supplier.config.journey.details_scope)
            .await?;
        let quote = supplier.extractor.extract(&text);

        if !quote.has_unit_rate() {
            return Err(JourneyError::Extraction("could not extract rates".into()));
        }
        if let Some(reason) = supplier.config.completeness.incomplete_reason(&quote) {
            warn!("Partial quote: {}", reason);
        }

        self.state.observe(Observation::Milestone);
        info!(
            "Extracted {} (elec {:?}p, gas {:?}p)",
            quote.tariff_name.as_deref().unwrap_or("unnamed tariff"),
            quote.elec_unit_rate_p.or(quote.elec_day_rate_p),
            quote.gas_unit_rate_p
        );
        Ok(vec![quote])
    }
}
