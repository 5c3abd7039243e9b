// src/infrastructure/vpn/mod.rs
mod zivpn;

pub use zivpn::{PasswordSyncMode, ZivpnServer};
