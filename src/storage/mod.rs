pub mod layout;
pub mod persister;
pub mod local;
pub mod remote;
