//! Meter-value domain: measurands, phases, units, and sampled values.
//!
//! A `MeterValue` is one timestamped batch of `SampledValue`s. Every optional
//! field is skipped when absent so that no `null` scalar ever reaches the
//! wire record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped batch of sampled values for a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterValue {
    pub timestamp: DateTime<Utc>,
    pub sampled_value: Vec<SampledValue>,
}

/// A single reading of one measurand at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledValue {
    /// Numeric reading rendered as a string, per OCPP 1.6.
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ReadingContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ValueFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurand: Option<Measurand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitOfMeasure>,
}

impl SampledValue {
    /// A bare sample with only a value; callers fill in the rest.
    pub fn of(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            context: None,
            format: None,
            measurand: None,
            phase: None,
            location: None,
            unit: None,
        }
    }
}

/// Context in which a sample was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingContext {
    #[serde(rename = "Interruption.Begin")]
    InterruptionBegin,
    #[serde(rename = "Interruption.End")]
    InterruptionEnd,
    #[serde(rename = "Other")]
    Other,
    #[serde(rename = "Sample.Clock")]
    SampleClock,
    #[serde(rename = "Sample.Periodic")]
    SamplePeriodic,
    #[serde(rename = "Transaction.Begin")]
    TransactionBegin,
    #[serde(rename = "Transaction.End")]
    TransactionEnd,
    #[serde(rename = "Trigger")]
    Trigger,
}

/// Raw or signed representation of the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueFormat {
    Raw,
    SignedData,
}

/// Quantity being sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measurand {
    #[serde(rename = "Current.Export")]
    CurrentExport,
    #[serde(rename = "Current.Import")]
    CurrentImport,
    #[serde(rename = "Current.Offered")]
    CurrentOffered,
    #[serde(rename = "Energy.Active.Export.Register")]
    EnergyActiveExportRegister,
    #[serde(rename = "Energy.Active.Import.Register")]
    EnergyActiveImportRegister,
    #[serde(rename = "Energy.Reactive.Export.Register")]
    EnergyReactiveExportRegister,
    #[serde(rename = "Energy.Reactive.Import.Register")]
    EnergyReactiveImportRegister,
    #[serde(rename = "Energy.Active.Import.Interval")]
    EnergyActiveImportInterval,
    #[serde(rename = "Frequency")]
    Frequency,
    #[serde(rename = "Power.Active.Export")]
    PowerActiveExport,
    #[serde(rename = "Power.Active.Import")]
    PowerActiveImport,
    #[serde(rename = "Power.Factor")]
    PowerFactor,
    #[serde(rename = "Power.Offered")]
    PowerOffered,
    #[serde(rename = "SoC")]
    StateOfCharge,
    #[serde(rename = "Temperature")]
    Temperature,
    #[serde(rename = "Voltage")]
    Voltage,
}

impl Default for Measurand {
    /// OCPP 1.6 treats an absent measurand as the energy register.
    fn default() -> Self {
        Measurand::EnergyActiveImportRegister
    }
}

/// Phase a sample refers to. Dashed variants are line-to-neutral or
/// line-to-line readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    L1,
    L2,
    L3,
    N,
    #[serde(rename = "L1-N")]
    L1N,
    #[serde(rename = "L2-N")]
    L2N,
    #[serde(rename = "L3-N")]
    L3N,
    #[serde(rename = "L1-L2")]
    L1L2,
    #[serde(rename = "L2-L3")]
    L2L3,
    #[serde(rename = "L3-L1")]
    L3L1,
}

/// Where the sample was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    Body,
    Cable,
    #[serde(rename = "EV")]
    Ev,
    Inlet,
    Outlet,
}

/// Unit of a sampled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitOfMeasure {
    Wh,
    #[serde(rename = "kWh")]
    KWh,
    #[serde(rename = "varh")]
    Varh,
    #[serde(rename = "kvarh")]
    Kvarh,
    W,
    #[serde(rename = "kW")]
    KW,
    #[serde(rename = "VA")]
    Va,
    #[serde(rename = "kVA")]
    Kva,
    #[serde(rename = "var")]
    Var,
    #[serde(rename = "kvar")]
    Kvar,
    A,
    V,
    K,
    Celsius,
    Fahrenheit,
    Percent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurand_wire_names() {
        assert_eq!(
            serde_json::to_string(&Measurand::EnergyActiveImportRegister).unwrap(),
            "\"Energy.Active.Import.Register\""
        );
        assert_eq!(
            serde_json::to_string(&Measurand::StateOfCharge).unwrap(),
            "\"SoC\""
        );
        assert_eq!(
            serde_json::to_string(&Measurand::PowerActiveImport).unwrap(),
            "\"Power.Active.Import\""
        );
    }

    #[test]
    fn phase_wire_names() {
        assert_eq!(serde_json::to_string(&Phase::L1N).unwrap(), "\"L1-N\"");
        assert_eq!(serde_json::to_string(&Phase::L3L1).unwrap(), "\"L3-L1\"");
        assert_eq!(serde_json::to_string(&Phase::L2).unwrap(), "\"L2\"");
    }

    #[test]
    fn absent_fields_do_not_serialize() {
        let sample = SampledValue::of("42.17");
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"value":"42.17"}"#);
    }

    #[test]
    fn meter_value_round_trip() {
        let mv = MeterValue {
            timestamp: DateTime::from_timestamp(1_717_000_000, 0).unwrap(),
            sampled_value: vec![SampledValue {
                value: "230.02".to_string(),
                context: Some(ReadingContext::SamplePeriodic),
                format: None,
                measurand: Some(Measurand::Voltage),
                phase: Some(Phase::L1N),
                location: None,
                unit: Some(UnitOfMeasure::V),
            }],
        };

        let json = serde_json::to_string(&mv).unwrap();
        assert!(json.contains("sampledValue"));
        let back: MeterValue = serde_json::from_str(&json).unwrap();
        assert_eq!(mv, back);
    }
}
