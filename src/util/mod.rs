pub mod instance_lock;
pub mod presenter;
pub mod privilege;
