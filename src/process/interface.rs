//! Network interface auto-detection

use crate::shaping::commands::{run_checked, AdminCommand, CommandRunner};
use std::net::IpAddr;

/// Interface that routes traffic to `target`.
///
/// Asks `ip route get` first, then falls back to the first non-loopback
/// interface with an IPv4 address.
pub fn detect_interface(runner: &dyn CommandRunner, target: IpAddr) -> Option<String> {
    let route = AdminCommand::new("ip", &["route", "get", &target.to_string()]);
    if let Ok(output) = run_checked(runner, &route) {
        if let Some(dev) = parse_route_device(&output.stdout) {
            return Some(dev);
        }
    }

    let addrs = AdminCommand::new("ip", &["-o", "-4", "addr", "show"]);
    run_checked(runner, &addrs)
        .ok()
        .and_then(|output| parse_first_interface(&output.stdout))
}

/// Extract the token following `dev` from `ip route get` output
pub fn parse_route_device(output: &str) -> Option<String> {
    let mut tokens = output.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "dev" {
            return tokens.next().map(str::to_string);
        }
    }
    None
}

/// First non-loopback interface from `ip -o -4 addr show` output
pub fn parse_first_interface(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|name| name.trim_end_matches(':'))
        .find(|name| *name != "lo" && !name.is_empty())
        .map(str::to_string)
}
