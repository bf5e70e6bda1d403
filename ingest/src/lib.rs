pub mod dates;
pub mod normalize;
pub mod reconcile;
pub mod sanitize;
pub mod segment;
pub mod sync;
pub mod task;
