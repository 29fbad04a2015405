use woothee::parser::Parser;

/// Device class and browser name derived from a User-Agent string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInfo {
    pub device: &'static str,
    pub browser: String,
}

pub const DEVICE_DESKTOP: &str = "desktop";
pub const DEVICE_MOBILE: &str = "mobile";
pub const DEVICE_TABLET: &str = "tablet";
pub const DEVICE_CONSOLE: &str = "console";
pub const UNKNOWN_BROWSER: &str = "Unknown";

/// Classify a User-Agent with woothee. Anything woothee cannot place falls
/// back to a desktop device and an "Unknown" browser.
pub fn classify(parser: &Parser, ua: &str) -> AgentInfo {
    let Some(result) = parser.parse(ua) else {
        return AgentInfo {
            device: DEVICE_DESKTOP,
            browser: UNKNOWN_BROWSER.to_owned(),
        };
    };

    let device = match result.category {
        "smartphone" | "mobilephone" if is_tablet(result.os, ua) => DEVICE_TABLET,
        "smartphone" | "mobilephone" => DEVICE_MOBILE,
        "appliance" => DEVICE_CONSOLE,
        _ => DEVICE_DESKTOP,
    };

    let browser = if result.name.is_empty() || result.name == "UNKNOWN" {
        UNKNOWN_BROWSER.to_owned()
    } else {
        result.name.to_owned()
    };

    AgentInfo { device, browser }
}

// woothee files tablets under "smartphone".
fn is_tablet(os: &str, ua: &str) -> bool {
    os == "iPad" || ua.contains("Tablet") || (os == "Android" && !ua.contains("Mobile"))
}
