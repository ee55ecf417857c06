pub mod admin;
pub mod auth;
pub mod events;
pub mod hierarchy;
pub mod letters;
pub mod opcode;
pub mod proxy;
pub mod scan;
