mod iptables;

pub use iptables::IptablesFilter;
