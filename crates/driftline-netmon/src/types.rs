use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthClass {
    FourG,
    ThreeG,
    TwoG,
    SlowTwoG,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Excellent,
    Good,
    Fair,
    Poor,
    Offline,
}

#[derive(Debug, Clone)]
pub struct NetworkMonitorConfig {
    pub ping_url: String,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

impl Default for NetworkMonitorConfig {
    fn default() -> Self {
        Self {
            ping_url: "https://www.gstatic.com/generate_204".to_string(),
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(5),
        }
    }
}

pub(crate) fn classify_from_bandwidth(class: BandwidthClass) -> Quality {
    match class {
        BandwidthClass::FourG => Quality::Excellent,
        BandwidthClass::ThreeG => Quality::Good,
        BandwidthClass::TwoG => Quality::Fair,
        BandwidthClass::SlowTwoG => Quality::Poor,
    }
}

pub(crate) fn classify_from_downlink(mbps: f64) -> Quality {
    if mbps >= 10.0 {
        Quality::Excellent
    } else if mbps >= 2.0 {
        Quality::Good
    } else if mbps >= 0.5 {
        Quality::Fair
    } else {
        Quality::Poor
    }
}

pub(crate) fn classify_from_latency(latency: Duration) -> Quality {
    if latency < Duration::from_millis(100) {
        Quality::Excellent
    } else if latency < Duration::from_millis(300) {
        Quality::Good
    } else if latency < Duration::from_secs(1) {
        Quality::Fair
    } else {
        Quality::Poor
    }
}
