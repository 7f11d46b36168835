use crate::address::CandidatePolicy;
use crate::blocker::BlockerClassifier;
use crate::config::Config;
use crate::extract::Extractor;
use crate::Result;

/// A loaded profile with its patterns compiled.
///
/// Immutable once built; batch tasks share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Supplier {
    pub config: Config,
    pub classifier: BlockerClassifier,
    pub extractor: Extractor,
    pub candidate_policy: CandidatePolicy,
}

impl Supplier {
    pub fn new(config: Config) -> Result<Self> {
        let classifier = BlockerClassifier::new(&config.blockers);
        let extractor = Extractor::new(&config.extraction)?;
        let candidate_policy = CandidatePolicy::from_config(&config.address);
        Ok(Self {
            config,
            classifier,
            extractor,
            candidate_policy,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}
