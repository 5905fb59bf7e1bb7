//! Prometheus metrics.
//!
//! Library code only talks to the `metrics` facade. Installing a recorder is
//! left to the binary (or the embedding application); without one, every
//! counter and gauge is a no-op.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;

/// Metrics configuration.
#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Address for the scrape endpoint; no HTTP listener when unset.
    pub listen_addr: Option<SocketAddr>,
}

impl MetricsConfig {
    /// Builds metrics configuration from the config file section.
    ///
    /// Environment overrides are applied later by
    /// [`crate::config::FlagwiseConfig::apply_overrides_from`].
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        Self {
            enabled: settings.and_then(|s| s.enabled).unwrap_or(false),
            listen_addr: settings.and_then(|s| s.port).map(listen_on),
        }
    }

    /// Serves the scrape endpoint on `port` on all interfaces.
    pub const fn set_port(&mut self, port: u16) {
        self.listen_addr = Some(listen_on(port));
    }
}

const fn listen_on(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
}

/// Installs the Prometheus recorder, with an HTTP listener when configured.
///
/// Returns `None` when metrics are disabled. The handle renders the current
/// exposition text.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed or the
/// listener cannot be started.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<PrometheusHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new();
    let handle = match config.listen_addr {
        Some(addr) => install_listener(builder.with_http_listener(addr))?,
        None => builder.install_recorder().map_err(|e| Error::OperationFailed {
            operation: "metrics_recorder_install".to_string(),
            cause: e.to_string(),
        })?,
    };

    tracing::debug!(listen_addr = ?config.listen_addr, "Prometheus recorder installed");
    Ok(Some(handle))
}

fn install_listener(builder: PrometheusBuilder) -> Result<PrometheusHandle> {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        return install_with_runtime(builder, &handle);
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_init".to_string(),
            cause: e.to_string(),
        })?;
    let handle = runtime.handle().clone();
    let prometheus = install_with_runtime(builder, &handle)?;
    thread::Builder::new()
        .name("flagwise-metrics-http".to_string())
        .spawn(move || runtime.block_on(std::future::pending::<()>()))
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_thread".to_string(),
            cause: e.to_string(),
        })?;
    Ok(prometheus)
}

fn install_with_runtime(
    builder: PrometheusBuilder,
    runtime_handle: &tokio::runtime::Handle,
) -> Result<PrometheusHandle> {
    let (recorder, exporter) = {
        let _guard = runtime_handle.enter();
        builder.build().map_err(|e| Error::OperationFailed {
            operation: "metrics_exporter_build".to_string(),
            cause: e.to_string(),
        })?
    };
    let handle = recorder.handle();
    set_global_recorder(recorder)?;
    runtime_handle.spawn(exporter);
    Ok(handle)
}

fn set_global_recorder(recorder: PrometheusRecorder) -> Result<()> {
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_installs_nothing() {
        let config = MetricsConfig::default();
        assert!(install_prometheus(&config).unwrap().is_none());
    }

    #[test]
    fn test_from_settings_port() {
        let settings = MetricsSettings {
            enabled: Some(true),
            port: Some(9464),
        };
        let mut config = MetricsConfig::from_settings(Some(&settings));
        assert!(config.enabled);
        assert_eq!(config.listen_addr.map(|addr| addr.port()), Some(9464));

        config.set_port(9100);
        assert_eq!(config.listen_addr.map(|addr| addr.port()), Some(9100));
        assert!(MetricsConfig::from_settings(None).listen_addr.is_none());
    }

    #[test]
    fn test_metrics_registry_smoke() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("flag_updates_total").increment(1);
        });
        assert!(handle.render().contains("flag_updates_total"));
    }
}
