//! Station template: the immutable boot-time snapshot of station constants
//! and per-measurand sampled-value templates.
//!
//! The template is loaded once by the launcher and never mutated by the
//! engine; every component reads it through the owning `Station`.

use crate::error::{StationError, StationResult};
use crate::features::FeatureProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use voltsim_types::measurand::{Location, Measurand, Phase, ReadingContext, UnitOfMeasure};

/// AC or DC output stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentType {
    #[serde(rename = "AC")]
    Ac,
    #[serde(rename = "DC")]
    Dc,
}

/// Per-measurand template used to synthesize one sampled value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledValueTemplate {
    /// Absent measurand means the energy register, per OCPP 1.6.
    #[serde(default)]
    pub measurand: Measurand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitOfMeasure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Literal value to fluctuate instead of drawing a random sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluctuation_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ReadingContext>,
}

impl SampledValueTemplate {
    pub fn for_measurand(measurand: Measurand) -> Self {
        Self {
            measurand,
            unit: None,
            phase: None,
            location: None,
            value: None,
            minimum_value: None,
            fluctuation_percent: None,
            context: None,
        }
    }
}

/// Sampled-value templates for one connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorTemplate {
    #[serde(default)]
    pub meter_values: Vec<SampledValueTemplate>,
}

/// Boot-time station constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationTemplate {
    pub template_name: String,
    pub charge_point_vendor: String,
    pub charge_point_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    pub current_out_type: CurrentType,
    /// Nominal output voltage in volts.
    pub voltage_out: f64,
    /// 1 or 3.
    pub number_of_phases: u32,
    /// Aggregate station power in watts.
    pub maximum_power: f64,
    /// Divides aggregate power into per-connector power. `None` or zero is
    /// a fatal configuration error surfaced as `InternalError` at use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_divider: Option<u32>,
    #[serde(default)]
    pub main_voltage_meter_values: bool,
    #[serde(default)]
    pub phase_line_to_line_voltage_meter_values: bool,
    #[serde(default)]
    pub custom_value_limitation_meter_values: bool,
    #[serde(default)]
    pub feature_profiles: Vec<FeatureProfile>,
    /// Physical connectors, excluding the station-level index 0.
    pub connector_count: u32,
    /// Templates keyed by connector id; id 0 holds the station-wide
    /// defaults used when a connector has no entry of its own.
    #[serde(default)]
    pub connectors: BTreeMap<u32, ConnectorTemplate>,
}

impl StationTemplate {
    /// Parse a JSON template document.
    pub fn from_json(raw: &str) -> StationResult<Self> {
        let template: StationTemplate =
            serde_json::from_str(raw).map_err(|e| StationError::Template(e.to_string()))?;
        template.validate()?;
        Ok(template)
    }

    /// Reject templates the synthesizer cannot work with.
    pub fn validate(&self) -> StationResult<()> {
        if self.number_of_phases != 1 && self.number_of_phases != 3 {
            return Err(StationError::Template(format!(
                "numberOfPhases must be 1 or 3, got {}",
                self.number_of_phases
            )));
        }
        if self.voltage_out <= 0.0 {
            return Err(StationError::Template(format!(
                "voltageOut must be positive, got {}",
                self.voltage_out
            )));
        }
        if self.maximum_power <= 0.0 {
            return Err(StationError::Template(format!(
                "maximumPower must be positive, got {}",
                self.maximum_power
            )));
        }
        if self.connector_count == 0 {
            return Err(StationError::Template("connectorCount must be at least 1".into()));
        }
        Ok(())
    }

    /// Resolve the most specific sampled-value template for a connector.
    ///
    /// Resolution order: exact `(measurand, phase)` on the connector's own
    /// list, then `(measurand, no phase)`, then the same two lookups on the
    /// station-wide list (connector 0). Absent measurand means the energy
    /// register.
    pub fn sampled_value_template(
        &self,
        connector_id: u32,
        measurand: Option<Measurand>,
        phase: Option<Phase>,
    ) -> Option<&SampledValueTemplate> {
        let measurand = measurand.unwrap_or_default();
        self.resolve_in(connector_id, measurand, phase)
            .or_else(|| (connector_id != 0).then(|| self.resolve_in(0, measurand, phase)).flatten())
    }

    fn resolve_in(
        &self,
        connector_id: u32,
        measurand: Measurand,
        phase: Option<Phase>,
    ) -> Option<&SampledValueTemplate> {
        let list = &self.connectors.get(&connector_id)?.meter_values;
        if phase.is_some() {
            if let Some(exact) = list
                .iter()
                .find(|tpl| tpl.measurand == measurand && tpl.phase == phase)
            {
                return Some(exact);
            }
        }
        list.iter().find(|tpl| tpl.measurand == measurand && tpl.phase.is_none())
    }
}
