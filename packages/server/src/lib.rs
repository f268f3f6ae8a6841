// Bubble Matchmaking - Core
//
// Groups of two to four people browse other complete groups, like or pass,
// and mutual likes become a match with a chat room. Formation and match
// events fan out over an in-process event bus.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
