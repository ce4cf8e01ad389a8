//! Fundamental type definitions shared by every Accord crate

pub mod identifiers;

pub use identifiers::{
    AccountId, IdentityId, NotaryId, ReplyId, RequestId, TaskId, UnitId,
};
