mod journey;
mod params;
mod schema;

pub use journey::{
    AddressStep, ClickAction, FillAction, JourneyConfig, PostcodeStep, PressKeyAction, StepAction,
    StepConfig, WaitAction,
};
pub use params::{ParamDef, Params};
pub use schema::{
    AddressConfig, BatchConfig, BrowserConfig, Config, ExtractionConfig, Region, RuleConfig,
    StartIndex, Viewport,
};
