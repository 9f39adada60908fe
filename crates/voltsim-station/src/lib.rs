//! # voltsim-station
//!
//! The OCPP 1.6-J charging-session engine: per-connector runtime state,
//! protocol-accurate meter-value synthesis, smart-charging profile
//! composition, and the connector state machine serving remote supervisory
//! commands.
//!
//! One station runs as a single cooperative task: no state is shared
//! mutably across stations, handlers run to completion between suspension
//! points, and meter emission never races the request handler. Components
//! reference connectors by index into the station-owned arena.

pub mod clock;
pub mod connector;
pub mod error;
pub mod features;
pub mod handler;
pub mod meter;
pub mod persist;
pub mod session;
pub mod smart_charging;
pub mod template;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use connector::{ConnectorLedger, ConnectorState, ProfileFilter, Reservation};
pub use error::{StationError, StationResult};
pub use features::{FeatureGate, FeatureProfile};
pub use template::{CurrentType, SampledValueTemplate, StationTemplate};
pub use transport::{PendingCalls, TransportSink};

use chrono::{DateTime, Utc};
use persist::{ConnectorStateStore, NullStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use voltsim_messages::v16::{BootNotificationRequest, HeartbeatRequest, MeterValuesRequest};
use voltsim_messages::{from_call_result, to_call, OcppAction};
use voltsim_types::v16::RegistrationStatus;

/// Launcher-owned settings for one station instance.
#[derive(Debug, Clone)]
pub struct StationConfig {
    pub station_id: String,
    /// CSMS WebSocket endpoint; carried for the launcher, unused by the
    /// engine once bootstrapped.
    pub supervision_url: String,
    pub heartbeat_interval: Duration,
    pub meter_value_sample_interval: Duration,
    /// Bound on outbound calls awaiting their CALLRESULT.
    pub call_timeout: Duration,
    /// Vendor ids accepted by `DataTransfer`.
    pub data_transfer_vendor_ids: Vec<String>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station_id: "VS-0001".to_string(),
            supervision_url: "ws://localhost:8080/ocpp".to_string(),
            heartbeat_interval: Duration::from_secs(300),
            meter_value_sample_interval: Duration::from_secs(60),
            call_timeout: Duration::from_secs(60),
            data_transfer_vendor_ids: Vec::new(),
        }
    }
}

/// One simulated charging station and the canonical state it owns.
pub struct Station {
    config: StationConfig,
    template: StationTemplate,
    power_divider: Option<u32>,
    gate: FeatureGate,
    pub(crate) ledger: ConnectorLedger,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) rng: StdRng,
    pub(crate) sink: Arc<dyn TransportSink>,
    store: Arc<dyn ConnectorStateStore>,
    heartbeat_interval: Duration,
}

impl Station {
    /// Build a station from its template snapshot. The template is
    /// validated once here and treated as immutable afterwards.
    pub fn new(
        config: StationConfig,
        template: StationTemplate,
        sink: Arc<dyn TransportSink>,
    ) -> StationResult<Self> {
        template.validate()?;
        let heartbeat_interval = config.heartbeat_interval;
        Ok(Self {
            gate: FeatureGate::new(template.feature_profiles.iter().copied()),
            ledger: ConnectorLedger::new(template.connector_count),
            power_divider: template.power_divider,
            clock: Arc::new(SystemClock),
            rng: StdRng::from_entropy(),
            sink,
            store: Arc::new(NullStore),
            heartbeat_interval,
            config,
            template,
        })
    }

    /// Replace the clock; tests drive a [`ManualClock`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the RNG; tests seed a deterministic one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Convenience for deterministic tests.
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    /// Replace the connector-state store.
    pub fn with_store(mut self, store: Arc<dyn ConnectorStateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn station_id(&self) -> &str {
        &self.config.station_id
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn template(&self) -> &StationTemplate {
        &self.template
    }

    pub fn feature_gate(&self) -> &FeatureGate {
        &self.gate
    }

    pub fn ledger(&self) -> &ConnectorLedger {
        &self.ledger
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn power_divider(&self) -> Option<u32> {
        self.power_divider
    }

    /// Override the power divider; `None` or zero makes every
    /// power-derived measurand fail with `InternalError`.
    pub fn set_power_divider(&mut self, divider: Option<u32>) {
        self.power_divider = divider;
    }

    /// Lifetime energy register of the connector carrying a transaction.
    pub fn energy_register_by_transaction(&self, transaction_id: i32) -> Option<f64> {
        self.ledger.energy_register_by_transaction(transaction_id)
    }

    /// Send a typed request and await its typed response.
    pub(crate) async fn send_request<T: OcppAction>(
        &self,
        request: &T,
    ) -> StationResult<T::Response> {
        let call = to_call(request)?;
        let result = self.sink.send(call).await?;
        Ok(from_call_result::<T>(&result)?)
    }

    /// Announce the station to the CSMS. On acceptance the returned
    /// heartbeat interval is applied and every connector reports its
    /// current status.
    pub async fn boot_notification(&mut self) -> StationResult<RegistrationStatus> {
        let request = BootNotificationRequest {
            charge_point_vendor: self.template.charge_point_vendor.clone(),
            charge_point_model: self.template.charge_point_model.clone(),
            charge_point_serial_number: Some(self.config.station_id.clone()),
            charge_box_serial_number: None,
            firmware_version: self.template.firmware_version.clone(),
            iccid: None,
            imsi: None,
            meter_type: None,
            meter_serial_number: None,
        };
        let response = self.send_request(&request).await?;

        if response.status == RegistrationStatus::Accepted {
            if response.interval > 0 {
                self.heartbeat_interval = Duration::from_secs(response.interval as u64);
            }
            info!(
                station_id = %self.config.station_id,
                heartbeat_secs = self.heartbeat_interval.as_secs(),
                "boot notification accepted"
            );
            for connector_id in 0..=self.ledger.connector_count() {
                self.push_status_notification(connector_id).await?;
            }
        } else {
            warn!(station_id = %self.config.station_id, status = ?response.status, "boot notification not accepted");
        }
        Ok(response.status)
    }

    /// Send a heartbeat and return the CSMS clock.
    pub async fn heartbeat(&self) -> StationResult<DateTime<Utc>> {
        let response = self.send_request(&HeartbeatRequest {}).await?;
        debug!(station_id = %self.config.station_id, csms_time = %response.current_time, "heartbeat");
        Ok(response.current_time)
    }

    /// One meter-value period: synthesize and emit a `MeterValues` request
    /// for every connector with a live transaction. Per-connector failures
    /// are logged, never propagated.
    pub async fn meter_values_tick(&mut self) {
        let interval = self.config.meter_value_sample_interval;
        for connector_id in 1..=self.ledger.connector_count() {
            let transaction_id = self.ledger.get(connector_id).and_then(|c| {
                c.transaction_started.then_some(c.transaction_id).flatten()
            });
            if transaction_id.is_none() {
                continue;
            }
            match self.build_meter_value(connector_id, transaction_id, interval, false) {
                Ok(meter_value) => {
                    let request = MeterValuesRequest {
                        connector_id,
                        transaction_id,
                        meter_value: vec![meter_value],
                    };
                    if let Err(err) = self.send_request(&request).await {
                        warn!(connector_id, %err, "failed to emit meter values");
                    }
                }
                Err(err) => warn!(connector_id, %err, "meter value synthesis failed"),
            }
        }
    }

    /// Cooperative driver loop: heartbeats and meter periods until the
    /// shutdown flag flips. State is persisted best-effort on exit.
    pub async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) {
        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        let mut meter = tokio::time::interval(self.config.meter_value_sample_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        meter.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if let Err(err) = self.heartbeat().await {
                        warn!(station_id = %self.config.station_id, %err, "heartbeat failed");
                    }
                }
                _ = meter.tick() => {
                    self.meter_values_tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(station_id = %self.config.station_id, "station shutting down");
                        break;
                    }
                }
            }
        }
        self.persist_state();
    }

    /// Best-effort snapshot of the connector arena.
    pub fn persist_state(&self) {
        if let Err(err) = self.store.save(&self.config.station_id, self.ledger.snapshot()) {
            warn!(station_id = %self.config.station_id, %err, "failed to persist connector state");
        }
    }

    /// Best-effort restore of a previously persisted arena.
    pub fn restore_state(&mut self) {
        match self.store.load(&self.config.station_id) {
            Ok(Some(snapshot)) => self.ledger.restore(snapshot),
            Ok(None) => {}
            Err(err) => {
                warn!(station_id = %self.config.station_id, %err, "failed to load connector state")
            }
        }
    }
}
