pub mod brief;
pub mod conversation;
pub mod decision;
pub mod retry;
pub mod signals;
pub mod signature;
pub mod verdict;
