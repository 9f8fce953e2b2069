pub mod applier;
pub mod arbiter;
pub mod stream;
pub mod sync;
pub mod upload;
