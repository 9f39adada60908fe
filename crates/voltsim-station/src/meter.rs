//! Meter-value synthesizer.
//!
//! Turns per-measurand sampled-value templates into protocol-accurate
//! `MeterValue` records. Samples are emitted in a fixed order: SoC,
//! aggregate voltage, per-phase voltage, aggregate power, per-phase power,
//! aggregate current, per-phase current, energy register. A measurand is
//! omitted iff no template resolves for it.
//!
//! Out-of-range synthesized values are surfaced, not clamped: they are
//! logged at error level and emitted unchanged unless the template value
//! runs through the custom-value limitation.

use crate::error::{StationError, StationResult};
use crate::template::{CurrentType, SampledValueTemplate};
use crate::Station;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, error, warn};
use voltsim_types::measurand::{
    Location, Measurand, MeterValue, Phase, ReadingContext, SampledValue, UnitOfMeasure,
};

/// Fluctuation applied when a template does not specify its own.
pub const DEFAULT_FLUCTUATION_PERCENT: f64 = 5.0;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Round to 2 decimals, the precision of periodic samples.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to 4 decimals, the precision of transaction boundary values.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Fluctuate a value by up to `percent` in either direction.
pub fn fluctuated<R: Rng>(value: f64, percent: f64, rng: &mut R) -> f64 {
    if percent <= 0.0 {
        return round2(value);
    }
    let swing = percent / 100.0;
    round2(value * (1.0 + rng.gen_range(-swing..=swing)))
}

/// Uniform draw in `[min, max]`, rounded to 2 decimals.
pub fn random_in<R: Rng>(min: f64, max: f64, rng: &mut R) -> f64 {
    if max <= min {
        return round2(min);
    }
    round2(rng.gen_range(min..=max))
}

/// Maximum amperage per phase for an AC output stage.
pub fn ac_amperage_per_phase(phases: u32, max_power: f64, voltage: f64) -> f64 {
    max_power / (voltage * phases as f64)
}

/// Maximum amperage for a DC output stage.
pub fn dc_amperage(max_power: f64, voltage: f64) -> f64 {
    max_power / voltage
}

/// Options for [`clamp_custom_value`].
#[derive(Debug, Clone, Copy)]
pub struct ClampOptions {
    /// When false the raw value passes through untouched.
    pub limitation_enabled: bool,
    /// Returned instead of an out-of-range value.
    pub fallback: f64,
    /// The raw value is interpreted pre-division by this divisor
    /// (e.g. a watt literal against a kW template).
    pub unit_divisor: f64,
}

/// Scale a template literal into the sample unit and, when limitation is
/// enabled, replace out-of-range values with the fallback.
pub fn clamp_custom_value(raw: f64, max: f64, min: f64, options: ClampOptions) -> f64 {
    let scaled = raw / options.unit_divisor;
    if options.limitation_enabled && (scaled < min || scaled > max) {
        warn!(raw, scaled, min, max, "custom meter value outside limits, using fallback");
        return options.fallback;
    }
    scaled
}

fn parse_literal(template: &SampledValueTemplate) -> Option<f64> {
    let raw = template.value.as_deref()?;
    match raw.parse::<f64>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(value = raw, measurand = ?template.measurand, "unparseable template value, drawing a random sample");
            None
        }
    }
}

fn format_value(value: f64) -> String {
    format!("{value}")
}

/// Build a sample from its template; fields appear iff their source is set.
fn sample(
    template: &SampledValueTemplate,
    value: String,
    phase: Option<Phase>,
    default_location: Option<Location>,
) -> SampledValue {
    SampledValue {
        value,
        context: Some(template.context.unwrap_or(ReadingContext::SamplePeriodic)),
        format: None,
        measurand: Some(template.measurand),
        phase: phase.or(template.phase),
        location: template.location.or(default_location),
        unit: template.unit,
    }
}

impl Station {
    /// Per-connector share of the station's aggregate power, in watts.
    pub fn connector_maximum_available_power(&self, _connector_id: u32) -> StationResult<f64> {
        let divider = self.power_divider_checked("MeterValues")?;
        Ok((self.template().maximum_power / divider as f64).round())
    }

    fn power_divider_checked(&self, command: &'static str) -> StationResult<u32> {
        match self.power_divider() {
            Some(divider) if divider > 0 => Ok(divider),
            _ => Err(StationError::PowerDivider { command }),
        }
    }

    /// Synthesize one `MeterValue` for a connector over a sampling
    /// interval, advancing the energy registers as a side effect.
    pub fn build_meter_value(
        &mut self,
        connector_id: u32,
        transaction_id: Option<i32>,
        interval: Duration,
        debug_energy: bool,
    ) -> StationResult<MeterValue> {
        if !self.ledger.contains(connector_id) {
            return Err(StationError::UnknownConnector(connector_id));
        }

        let timestamp = self.clock.now();
        let mut sampled_value = Vec::new();

        self.push_soc_sample(connector_id, &mut sampled_value);
        self.push_voltage_samples(connector_id, &mut sampled_value);
        self.push_power_samples(connector_id, &mut sampled_value)?;
        self.push_current_samples(connector_id, &mut sampled_value)?;
        self.push_energy_sample(
            connector_id,
            transaction_id,
            interval,
            debug_energy,
            &mut sampled_value,
        )?;

        Ok(MeterValue { timestamp, sampled_value })
    }

    fn resolve_template(
        &self,
        connector_id: u32,
        measurand: Measurand,
        phase: Option<Phase>,
    ) -> Option<SampledValueTemplate> {
        self.template().sampled_value_template(connector_id, Some(measurand), phase).cloned()
    }

    /// Fluctuated literal or uniform draw in `[min, max]`.
    fn synthesized_value(
        &mut self,
        template: &SampledValueTemplate,
        min: f64,
        max: f64,
    ) -> f64 {
        match parse_literal(template) {
            Some(raw) => {
                let clamped = clamp_custom_value(
                    raw,
                    max,
                    min,
                    ClampOptions {
                        limitation_enabled: self.template().custom_value_limitation_meter_values,
                        fallback: max,
                        unit_divisor: 1.0,
                    },
                );
                let percent =
                    template.fluctuation_percent.unwrap_or(DEFAULT_FLUCTUATION_PERCENT);
                fluctuated(clamped, percent, &mut self.rng)
            }
            None => random_in(min, max, &mut self.rng),
        }
    }

    fn push_soc_sample(&mut self, connector_id: u32, out: &mut Vec<SampledValue>) {
        let Some(template) = self.resolve_template(connector_id, Measurand::StateOfCharge, None)
        else {
            return;
        };
        let min = template.minimum_value.unwrap_or(0.0);
        let value = self.synthesized_value(&template, min, 100.0);
        if !(0.0..=100.0).contains(&value) {
            error!(connector_id, value, "synthesized SoC outside [0, 100]");
        }
        out.push(sample(&template, format_value(value), None, Some(Location::Ev)));
    }

    fn voltage_value(&mut self, template: &SampledValueTemplate, nominal: f64) -> f64 {
        let percent = template.fluctuation_percent.unwrap_or(DEFAULT_FLUCTUATION_PERCENT);
        match parse_literal(template) {
            Some(raw) => fluctuated(raw, percent, &mut self.rng),
            None => fluctuated(nominal, percent, &mut self.rng),
        }
    }

    fn push_voltage_samples(&mut self, connector_id: u32, out: &mut Vec<SampledValue>) {
        let Some(template) = self.resolve_template(connector_id, Measurand::Voltage, None) else {
            return;
        };
        let voltage_out = self.template().voltage_out;
        let three_phase = self.template().number_of_phases == 3;

        // Aggregate voltage only for single-phase stations or when the
        // template opts three-phase stations in.
        if !three_phase || self.template().main_voltage_meter_values {
            let value = self.voltage_value(&template, voltage_out);
            out.push(sample(&template, format_value(value), None, None));
        }

        if three_phase {
            for phase in [Phase::L1N, Phase::L2N, Phase::L3N] {
                let phase_template = self
                    .resolve_template(connector_id, Measurand::Voltage, Some(phase))
                    .unwrap_or_else(|| template.clone());
                let value = self.voltage_value(&phase_template, voltage_out);
                out.push(sample(&phase_template, format_value(value), Some(phase), None));
            }
            if self.template().phase_line_to_line_voltage_meter_values {
                let nominal_line_to_line = round2(SQRT_3 * voltage_out);
                for phase in [Phase::L1L2, Phase::L2L3, Phase::L3L1] {
                    let phase_template = self
                        .resolve_template(connector_id, Measurand::Voltage, Some(phase))
                        .unwrap_or_else(|| template.clone());
                    let value = self.voltage_value(&phase_template, nominal_line_to_line);
                    out.push(sample(&phase_template, format_value(value), Some(phase), None));
                }
            }
        }
    }

    fn push_power_samples(
        &mut self,
        connector_id: u32,
        out: &mut Vec<SampledValue>,
    ) -> StationResult<()> {
        let Some(template) =
            self.resolve_template(connector_id, Measurand::PowerActiveImport, None)
        else {
            return Ok(());
        };
        let connector_max_power = self.connector_maximum_available_power(connector_id)?;
        let unit_divisor = match template.unit {
            Some(UnitOfMeasure::KW) => 1000.0,
            _ => 1.0,
        };
        let max_power = connector_max_power / unit_divisor;
        let min = template.minimum_value.unwrap_or(0.0);
        let percent = template.fluctuation_percent.unwrap_or(DEFAULT_FLUCTUATION_PERCENT);

        match (self.template().current_out_type, self.template().number_of_phases) {
            (CurrentType::Ac, 3) => {
                let per_phase_max = max_power / 3.0;
                let literal = parse_literal(&template).map(|raw| {
                    clamp_custom_value(
                        raw,
                        max_power,
                        min,
                        ClampOptions {
                            limitation_enabled: self
                                .template()
                                .custom_value_limitation_meter_values,
                            fallback: max_power,
                            unit_divisor,
                        },
                    )
                });
                let mut phase_values = [0.0_f64; 3];
                for value in phase_values.iter_mut() {
                    *value = match literal {
                        Some(base) => fluctuated(base / 3.0, percent, &mut self.rng),
                        None => random_in(min / 3.0, per_phase_max, &mut self.rng),
                    };
                }
                let aggregate = round2(phase_values.iter().sum());
                out.push(sample(&template, format_value(aggregate), None, None));
                for (value, phase) in
                    phase_values.iter().zip([Phase::L1, Phase::L2, Phase::L3])
                {
                    out.push(sample(&template, format_value(*value), Some(phase), None));
                }
            }
            (CurrentType::Ac, _) => {
                // Single phase: L2 and L3 contribute nothing, the aggregate
                // is the single phase value.
                let aggregate = self.synthesized_value(&template, min, max_power);
                out.push(sample(&template, format_value(aggregate), None, None));
            }
            (CurrentType::Dc, _) => {
                let aggregate = self.synthesized_value(&template, min, max_power);
                out.push(sample(&template, format_value(aggregate), None, None));
            }
        }
        Ok(())
    }

    fn push_current_samples(
        &mut self,
        connector_id: u32,
        out: &mut Vec<SampledValue>,
    ) -> StationResult<()> {
        let Some(template) = self.resolve_template(connector_id, Measurand::CurrentImport, None)
        else {
            return Ok(());
        };
        let connector_max_power = self.connector_maximum_available_power(connector_id)?;
        let voltage_out = self.template().voltage_out;
        let phases = self.template().number_of_phases;
        let min = template.minimum_value.unwrap_or(0.0);

        match self.template().current_out_type {
            CurrentType::Ac => {
                let max_amperage =
                    round2(ac_amperage_per_phase(phases, connector_max_power, voltage_out));
                if phases == 3 {
                    let mut phase_values = [0.0_f64; 3];
                    for value in phase_values.iter_mut() {
                        *value = self.synthesized_value(&template, min, max_amperage);
                    }
                    // Aggregate current is the per-phase average, not a sum.
                    let aggregate = round2(phase_values.iter().sum::<f64>() / phases as f64);
                    out.push(sample(&template, format_value(aggregate), None, None));
                    for (value, phase) in
                        phase_values.iter().zip([Phase::L1, Phase::L2, Phase::L3])
                    {
                        out.push(sample(&template, format_value(*value), Some(phase), None));
                    }
                } else {
                    let aggregate = self.synthesized_value(&template, min, max_amperage);
                    out.push(sample(&template, format_value(aggregate), None, None));
                }
            }
            CurrentType::Dc => {
                let max_amperage = round2(dc_amperage(connector_max_power, voltage_out));
                let aggregate = self.synthesized_value(&template, min, max_amperage);
                out.push(sample(&template, format_value(aggregate), None, None));
            }
        }
        Ok(())
    }

    fn push_energy_sample(
        &mut self,
        connector_id: u32,
        transaction_id: Option<i32>,
        interval: Duration,
        debug_energy: bool,
        out: &mut Vec<SampledValue>,
    ) -> StationResult<()> {
        let Some(template) =
            self.template().sampled_value_template(connector_id, None, None).cloned()
        else {
            warn!(connector_id, "no energy template resolves, omitting energy sample");
            return Ok(());
        };
        let connector_max_power = self.connector_maximum_available_power(connector_id)?;
        let unit_divisor = match template.unit {
            Some(UnitOfMeasure::KWh) => 1000.0,
            _ => 1.0,
        };
        let interval_millis = interval.as_millis() as f64;
        let max_energy = round2(connector_max_power * interval_millis / 3_600_000.0 / unit_divisor);
        let min = template.minimum_value.unwrap_or(0.0);

        let increment = match parse_literal(&template) {
            Some(raw) => {
                let clamped = clamp_custom_value(
                    raw,
                    max_energy,
                    min,
                    ClampOptions {
                        limitation_enabled: self.template().custom_value_limitation_meter_values,
                        fallback: max_energy,
                        unit_divisor,
                    },
                );
                let percent =
                    template.fluctuation_percent.unwrap_or(DEFAULT_FLUCTUATION_PERCENT);
                fluctuated(clamped, percent, &mut self.rng)
            }
            None => random_in(min.min(max_energy), max_energy, &mut self.rng),
        };

        self.ledger.add_energy(connector_id, increment * unit_divisor);

        let register_wh = transaction_id
            .and_then(|id| self.ledger.energy_register_by_transaction(id))
            .or_else(|| self.ledger.get(connector_id).map(|c| c.energy_active_import_register))
            .unwrap_or(0.0);
        let value = round2(register_wh / unit_divisor);

        if debug_energy {
            debug!(
                connector_id,
                interval_millis, increment, max_energy, register_wh, "energy sample synthesized"
            );
        }

        out.push(sample(&template, format_value(value), None, None));
        Ok(())
    }

    fn transaction_boundary_meter_value(
        &self,
        connector_id: u32,
        register_wh: f64,
        context: ReadingContext,
    ) -> MeterValue {
        let template = self
            .template()
            .sampled_value_template(connector_id, None, None)
            .cloned()
            .unwrap_or_else(|| {
                SampledValueTemplate::for_measurand(Measurand::EnergyActiveImportRegister)
            });
        let unit_divisor = match template.unit {
            Some(UnitOfMeasure::KWh) => 1000.0,
            _ => 1.0,
        };
        let value = round4(register_wh / unit_divisor);
        let mut boundary = sample(&template, format_value(value), None, None);
        boundary.context = Some(context);
        MeterValue { timestamp: self.clock.now(), sampled_value: vec![boundary] }
    }

    /// Single energy sample tagged `Transaction.Begin`, at 4 decimals.
    pub fn build_transaction_begin_meter_value(
        &self,
        connector_id: u32,
        meter_start_wh: f64,
    ) -> MeterValue {
        self.transaction_boundary_meter_value(
            connector_id,
            meter_start_wh,
            ReadingContext::TransactionBegin,
        )
    }

    /// Single energy sample tagged `Transaction.End`, at 4 decimals.
    pub fn build_transaction_end_meter_value(
        &self,
        connector_id: u32,
        meter_stop_wh: f64,
    ) -> MeterValue {
        self.transaction_boundary_meter_value(
            connector_id,
            meter_stop_wh,
            ReadingContext::TransactionEnd,
        )
    }
}

/// Transaction data for `StopTransaction`: begin value then end value.
pub fn build_transaction_data_meter_values(
    begin: MeterValue,
    end: MeterValue,
) -> Vec<MeterValue> {
    vec![begin, end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ConnectorTemplate;
    use crate::testing::{ac_single_phase_template, energy_template_wh, station_with};
    use crate::transport::ScriptedSink;
    use std::sync::Arc;

    fn template_for(measurand: Measurand, unit: Option<UnitOfMeasure>) -> SampledValueTemplate {
        let mut template = SampledValueTemplate::for_measurand(measurand);
        template.unit = unit;
        template
    }

    fn full_meter_values() -> Vec<SampledValueTemplate> {
        vec![
            energy_template_wh(),
            template_for(Measurand::StateOfCharge, None),
            template_for(Measurand::Voltage, Some(UnitOfMeasure::V)),
            template_for(Measurand::PowerActiveImport, Some(UnitOfMeasure::W)),
            template_for(Measurand::CurrentImport, Some(UnitOfMeasure::A)),
        ]
    }

    fn three_phase_template() -> crate::StationTemplate {
        let mut template = ac_single_phase_template();
        template.number_of_phases = 3;
        template.maximum_power = 22080.0;
        template
    }

    fn value_of(sample: &SampledValue) -> f64 {
        sample.value.parse().unwrap()
    }

    fn decimals_of(sample: &SampledValue) -> usize {
        sample.value.split('.').nth(1).map(str::len).unwrap_or(0)
    }

    #[test]
    fn single_phase_energy_accumulates_within_interval_bounds() {
        // 7360 W over 60 s caps the increment at 122.67 Wh.
        let mut station = station_with(ac_single_phase_template(), Arc::new(ScriptedSink::new()));
        station.ledger.begin_transaction(1, 7, "TAG");

        let mut previous_register = 0.0;
        for _ in 0..2 {
            let meter_value = station
                .build_meter_value(1, Some(7), Duration::from_millis(60_000), false)
                .unwrap();
            assert_eq!(meter_value.sampled_value.len(), 1);

            let connector = station.ledger().get(1).unwrap();
            let lifetime = connector.energy_active_import_register;
            let session = connector.transaction_energy_active_import_register;
            let delta = lifetime - previous_register;

            assert!((0.0..=122.67).contains(&delta), "delta {delta} out of bounds");
            assert!(lifetime >= previous_register, "register must not decrease");
            assert!(session <= lifetime);
            assert_eq!(value_of(&meter_value.sampled_value[0]), round2(lifetime));
            previous_register = lifetime;
        }
    }

    #[test]
    fn three_phase_voltage_phases_emit_in_order() {
        let mut template = three_phase_template();
        template.phase_line_to_line_voltage_meter_values = true;
        template.connectors.insert(
            0,
            ConnectorTemplate {
                meter_values: vec![
                    energy_template_wh(),
                    template_for(Measurand::Voltage, Some(UnitOfMeasure::V)),
                ],
            },
        );
        let mut station = station_with(template, Arc::new(ScriptedSink::new()));

        let meter_value =
            station.build_meter_value(1, None, Duration::from_millis(60_000), false).unwrap();
        let voltages: Vec<&SampledValue> = meter_value
            .sampled_value
            .iter()
            .filter(|sample| sample.measurand == Some(Measurand::Voltage))
            .collect();

        let phases: Vec<Option<Phase>> = voltages.iter().map(|sample| sample.phase).collect();
        // mainVoltageMeterValues is off, so no aggregate: line-to-neutral
        // phases first, then the line-to-line triplet.
        assert_eq!(
            phases,
            vec![
                Some(Phase::L1N),
                Some(Phase::L2N),
                Some(Phase::L3N),
                Some(Phase::L1L2),
                Some(Phase::L2L3),
                Some(Phase::L3L1),
            ]
        );

        // Nominal line-to-line magnitude is sqrt(3) * 230 = 398.37, with
        // up to 5% fluctuation, at 2 decimals.
        for sample in &voltages[3..] {
            let value = value_of(sample);
            assert!((378.45..=418.29).contains(&value), "L-L voltage {value} out of band");
            assert!(decimals_of(sample) <= 2);
        }
        for sample in &voltages[..3] {
            let value = value_of(sample);
            assert!((218.5..=241.5).contains(&value), "L-N voltage {value} out of band");
        }
    }

    #[test]
    fn aggregate_voltage_requires_opt_in_on_three_phase() {
        let mut template = three_phase_template();
        template.main_voltage_meter_values = true;
        template.connectors.insert(
            0,
            ConnectorTemplate {
                meter_values: vec![
                    energy_template_wh(),
                    template_for(Measurand::Voltage, Some(UnitOfMeasure::V)),
                ],
            },
        );
        let mut station = station_with(template, Arc::new(ScriptedSink::new()));

        let meter_value =
            station.build_meter_value(1, None, Duration::from_millis(60_000), false).unwrap();
        let first_voltage = meter_value
            .sampled_value
            .iter()
            .find(|sample| sample.measurand == Some(Measurand::Voltage))
            .unwrap();
        assert_eq!(first_voltage.phase, None);
    }

    #[test]
    fn three_phase_power_aggregate_is_the_phase_sum() {
        let mut template = three_phase_template();
        template
            .connectors
            .insert(0, ConnectorTemplate { meter_values: full_meter_values() });
        let mut station = station_with(template, Arc::new(ScriptedSink::new()));
        station.ledger.begin_transaction(1, 7, "TAG");

        let meter_value =
            station.build_meter_value(1, Some(7), Duration::from_millis(60_000), false).unwrap();
        let power: Vec<&SampledValue> = meter_value
            .sampled_value
            .iter()
            .filter(|sample| sample.measurand == Some(Measurand::PowerActiveImport))
            .collect();

        assert_eq!(power.len(), 4);
        assert_eq!(power[0].phase, None);
        let aggregate = value_of(power[0]);
        let phase_sum: f64 = power[1..].iter().map(|sample| value_of(sample)).sum();
        assert!((aggregate - phase_sum).abs() <= 0.01);

        // Each phase is bounded by a third of the connector power budget.
        let per_phase_cap = 22080.0 / 3.0;
        for sample in &power[1..] {
            assert!(value_of(sample) <= per_phase_cap);
        }
    }

    #[test]
    fn three_phase_current_aggregate_is_the_phase_average() {
        let mut template = three_phase_template();
        template
            .connectors
            .insert(0, ConnectorTemplate { meter_values: full_meter_values() });
        let mut station = station_with(template, Arc::new(ScriptedSink::new()));

        let meter_value =
            station.build_meter_value(1, None, Duration::from_millis(60_000), false).unwrap();
        let current: Vec<&SampledValue> = meter_value
            .sampled_value
            .iter()
            .filter(|sample| sample.measurand == Some(Measurand::CurrentImport))
            .collect();

        assert_eq!(current.len(), 4);
        let aggregate = value_of(current[0]);
        let phase_average: f64 =
            current[1..].iter().map(|sample| value_of(sample)).sum::<f64>() / 3.0;
        assert!((aggregate - phase_average).abs() <= 0.01);

        // Per-phase draw bounded by P / (U * phases) = 22080 / 690 = 32 A.
        for sample in &current[1..] {
            assert!(value_of(sample) <= 32.0);
        }
    }

    #[test]
    fn soc_stays_within_percent_bounds() {
        let mut template = ac_single_phase_template();
        template.connectors.insert(
            0,
            ConnectorTemplate {
                meter_values: vec![
                    energy_template_wh(),
                    template_for(Measurand::StateOfCharge, None),
                ],
            },
        );
        let mut station = station_with(template, Arc::new(ScriptedSink::new()));

        for _ in 0..32 {
            let meter_value =
                station.build_meter_value(1, None, Duration::from_millis(60_000), false).unwrap();
            let soc = meter_value
                .sampled_value
                .iter()
                .find(|sample| sample.measurand == Some(Measurand::StateOfCharge))
                .unwrap();
            let value = value_of(soc);
            assert!((0.0..=100.0).contains(&value), "SoC {value} out of range");
            assert_eq!(soc.location, Some(Location::Ev));
            assert_eq!(soc.unit, None);
        }
    }

    #[test]
    fn samples_emit_in_the_fixed_measurand_order() {
        let mut template = three_phase_template();
        template.phase_line_to_line_voltage_meter_values = true;
        template
            .connectors
            .insert(0, ConnectorTemplate { meter_values: full_meter_values() });
        let mut station = station_with(template, Arc::new(ScriptedSink::new()));
        station.ledger.begin_transaction(1, 7, "TAG");

        let meter_value =
            station.build_meter_value(1, Some(7), Duration::from_millis(60_000), false).unwrap();
        let measurands: Vec<Measurand> =
            meter_value.sampled_value.iter().map(|s| s.measurand.unwrap()).collect();

        let expected = [
            Measurand::StateOfCharge,
            Measurand::Voltage,
            Measurand::Voltage,
            Measurand::Voltage,
            Measurand::Voltage,
            Measurand::Voltage,
            Measurand::Voltage,
            Measurand::PowerActiveImport,
            Measurand::PowerActiveImport,
            Measurand::PowerActiveImport,
            Measurand::PowerActiveImport,
            Measurand::CurrentImport,
            Measurand::CurrentImport,
            Measurand::CurrentImport,
            Measurand::CurrentImport,
            Measurand::EnergyActiveImportRegister,
        ];
        assert_eq!(measurands, expected);
    }

    #[test]
    fn no_null_scalar_leaks_into_the_record() {
        let mut template = three_phase_template();
        template
            .connectors
            .insert(0, ConnectorTemplate { meter_values: full_meter_values() });
        let mut station = station_with(template, Arc::new(ScriptedSink::new()));

        let meter_value =
            station.build_meter_value(1, None, Duration::from_millis(60_000), false).unwrap();
        let json = serde_json::to_string(&meter_value).unwrap();
        assert!(!json.contains("null"), "null leaked into {json}");
    }

    #[test]
    fn missing_power_divider_is_an_internal_error() {
        let mut template = ac_single_phase_template();
        template.connectors.insert(
            0,
            ConnectorTemplate {
                meter_values: vec![
                    energy_template_wh(),
                    template_for(Measurand::PowerActiveImport, Some(UnitOfMeasure::W)),
                ],
            },
        );
        let mut station = station_with(template, Arc::new(ScriptedSink::new()));
        station.set_power_divider(None);

        let err =
            station.build_meter_value(1, None, Duration::from_millis(60_000), false).unwrap_err();
        assert!(matches!(err, StationError::PowerDivider { command: "MeterValues" }));

        station.set_power_divider(Some(0));
        let err =
            station.build_meter_value(1, None, Duration::from_millis(60_000), false).unwrap_err();
        assert_eq!(err.call_error_code(), voltsim_types::CallErrorCode::InternalError);
    }

    #[test]
    fn unknown_connector_is_rejected() {
        let mut station = station_with(ac_single_phase_template(), Arc::new(ScriptedSink::new()));
        let err =
            station.build_meter_value(9, None, Duration::from_millis(60_000), false).unwrap_err();
        assert!(matches!(err, StationError::UnknownConnector(9)));
    }

    #[test]
    fn literal_template_value_is_fluctuated_and_limited() {
        let mut soc = template_for(Measurand::StateOfCharge, None);
        soc.value = Some("250".to_string());
        let mut template = ac_single_phase_template();
        template.custom_value_limitation_meter_values = true;
        template.connectors.insert(
            0,
            ConnectorTemplate { meter_values: vec![energy_template_wh(), soc] },
        );
        let mut station = station_with(template, Arc::new(ScriptedSink::new()));

        let meter_value =
            station.build_meter_value(1, None, Duration::from_millis(60_000), false).unwrap();
        let soc = meter_value
            .sampled_value
            .iter()
            .find(|sample| sample.measurand == Some(Measurand::StateOfCharge))
            .unwrap();
        // 250 is outside [0, 100]: the limitation falls back to the
        // maximum, fluctuation stays within 5%.
        assert!(value_of(soc) <= 105.0);
    }

    #[test]
    fn fluctuation_is_deterministic_under_a_seed() {
        use rand::SeedableRng;

        let mut rng_a = rand::rngs::StdRng::seed_from_u64(42);
        let mut rng_b = rand::rngs::StdRng::seed_from_u64(42);

        assert_eq!(fluctuated(230.0, 5.0, &mut rng_a), fluctuated(230.0, 5.0, &mut rng_b));
        assert_eq!(random_in(0.0, 100.0, &mut rng_a), random_in(0.0, 100.0, &mut rng_b));
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(round2(122.6666), 122.67);
        assert_eq!(round2(398.371_24), 398.37);
        assert_eq!(round4(18.342_449_9), 18.3424);
        assert_eq!(round4(18.342_45), 18.3425);
    }

    #[test]
    fn clamp_passes_through_when_limitation_disabled() {
        let options =
            ClampOptions { limitation_enabled: false, fallback: 100.0, unit_divisor: 1.0 };
        assert_eq!(clamp_custom_value(250.0, 100.0, 0.0, options), 250.0);

        let options =
            ClampOptions { limitation_enabled: true, fallback: 100.0, unit_divisor: 1.0 };
        assert_eq!(clamp_custom_value(250.0, 100.0, 0.0, options), 100.0);
        assert_eq!(clamp_custom_value(50.0, 100.0, 0.0, options), 50.0);

        // Watt literal against a kW bound.
        let options =
            ClampOptions { limitation_enabled: true, fallback: 7.36, unit_divisor: 1000.0 };
        assert_eq!(clamp_custom_value(7360.0, 7.36, 0.0, options), 7.36);
    }

    #[test]
    fn transaction_boundary_values_use_four_decimals() {
        let station = station_with(ac_single_phase_template(), Arc::new(ScriptedSink::new()));

        let begin = station.build_transaction_begin_meter_value(1, 18.342_449);
        assert_eq!(begin.sampled_value.len(), 1);
        assert_eq!(begin.sampled_value[0].value, "18.3424");
        assert_eq!(begin.sampled_value[0].context, Some(ReadingContext::TransactionBegin));

        let end = station.build_transaction_end_meter_value(1, 145.9);
        assert_eq!(end.sampled_value[0].context, Some(ReadingContext::TransactionEnd));

        let data = build_transaction_data_meter_values(begin.clone(), end.clone());
        assert_eq!(data, vec![begin, end]);
    }

    #[test]
    fn amperage_helpers() {
        assert_eq!(ac_amperage_per_phase(1, 7360.0, 230.0), 32.0);
        assert_eq!(ac_amperage_per_phase(3, 22080.0, 230.0), 32.0);
        assert_eq!(dc_amperage(50000.0, 400.0), 125.0);
    }
}
