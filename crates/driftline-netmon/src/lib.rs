mod monitor;
mod types;

pub use monitor::NetworkMonitor;
pub use types::{BandwidthClass, NetworkMonitorConfig, Quality};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::{classify_from_bandwidth, classify_from_downlink, classify_from_latency};

    #[test]
    fn bandwidth_class_maps_to_quality() {
        assert_eq!(classify_from_bandwidth(BandwidthClass::FourG), Quality::Excellent);
        assert_eq!(classify_from_bandwidth(BandwidthClass::ThreeG), Quality::Good);
        assert_eq!(classify_from_bandwidth(BandwidthClass::TwoG), Quality::Fair);
        assert_eq!(classify_from_bandwidth(BandwidthClass::SlowTwoG), Quality::Poor);
    }

    #[test]
    fn downlink_thresholds() {
        assert_eq!(classify_from_downlink(20.0), Quality::Excellent);
        assert_eq!(classify_from_downlink(5.0), Quality::Good);
        assert_eq!(classify_from_downlink(1.0), Quality::Fair);
        assert_eq!(classify_from_downlink(0.1), Quality::Poor);
    }

    #[test]
    fn latency_thresholds() {
        assert_eq!(classify_from_latency(Duration::from_millis(50)), Quality::Excellent);
        assert_eq!(classify_from_latency(Duration::from_millis(200)), Quality::Good);
        assert_eq!(classify_from_latency(Duration::from_millis(800)), Quality::Fair);
        assert_eq!(classify_from_latency(Duration::from_secs(2)), Quality::Poor);
    }

    #[tokio::test]
    async fn reporting_bandwidth_class_updates_quality_and_online_streams() {
        let monitor = NetworkMonitor::new(NetworkMonitorConfig::default());
        let mut quality_rx = monitor.quality_stream();
        let mut status_rx = monitor.status();

        monitor.report_bandwidth_class(BandwidthClass::TwoG);

        assert_eq!(monitor.quality(), Quality::Fair);
        assert!(monitor.is_online());
        assert_eq!(*quality_rx.borrow_and_update(), Quality::Fair);
        assert!(*status_rx.borrow_and_update());
    }

    #[tokio::test]
    async fn reporting_downlink_is_overridden_by_a_declared_bandwidth_class() {
        let monitor = NetworkMonitor::new(NetworkMonitorConfig::default());
        monitor.report_bandwidth_class(BandwidthClass::FourG);
        monitor.report_downlink_mbps(0.2);

        // a declared class takes precedence over measured downlink.
        assert_eq!(monitor.quality(), Quality::Excellent);
    }

    #[test]
    fn destroy_is_idempotent_without_init() {
        let monitor = NetworkMonitor::new(NetworkMonitorConfig::default());
        monitor.destroy();
        monitor.destroy();
    }
}
