use crate::types::Device;
use once_cell::sync::Lazy;
use regex::Regex;

static BOT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)bot|spider|crawl|headless|curl|wget|preview|monitor|uptime|slurp|facebookexternalhit|discordbot|whatsapp|telegram",
    )
    .unwrap()
});

static TABLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ipad|tablet|nexus 7|nexus 10|sm-t|kindle").unwrap());

static MOBILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"iphone|android|mobile|ipod").unwrap());

static DESKTOP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"macintosh|windows|linux").unwrap());

/// True when the user agent matches a crawler, preview or monitoring signature.
pub fn is_bot_user_agent(user_agent: &str) -> bool {
    !user_agent.is_empty() && BOT_RE.is_match(user_agent)
}

/// Classify a user agent into a device class. The bot signature is checked
/// before any device table, so "Mozilla/5.0 (Linux) Googlebot" is a bot.
pub fn classify_device(user_agent: &str) -> Device {
    let ua = user_agent.to_lowercase();
    if ua.is_empty() {
        return Device::Unknown;
    }
    if BOT_RE.is_match(&ua) {
        return Device::Bot;
    }
    if TABLET_RE.is_match(&ua) {
        return Device::Tablet;
    }
    if MOBILE_RE.is_match(&ua) {
        return Device::Mobile;
    }
    if DESKTOP_RE.is_match(&ua) {
        return Device::Desktop;
    }
    Device::Unknown
}
