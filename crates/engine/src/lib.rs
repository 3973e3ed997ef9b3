//! OfferPilot engine — online logistic-regression oracles, contextual
//! bandit decisioning (softmax sampling, ordered slates), numeric
//! primitives, and FIFO-serialized training.

pub mod bandit;
pub mod math;
pub mod mutex;
pub mod oracle;

pub use bandit::{
    Bandit, BanditConfig, BanditState, DecisionOptions, OracleScoredAction, ScoredAction,
};
pub use mutex::UpdateMutex;
pub use oracle::{Oracle, OracleConfig, OracleState, CLICK_LABEL, INTERCEPT};
