//! Inbound command dispatcher.
//!
//! Every CALL runs the same pipeline: feature-profile gate, payload
//! deserialization (`FormationViolation` on failure), constraint
//! validation (`PropertyConstraintViolation`), then the component handler.
//! Failures surface as CALLERRORs through
//! [`StationError::call_error_code`].

use crate::error::{StationError, StationResult};
use crate::features::FeatureProfile;
use crate::smart_charging::{composite_schedule, ScheduleWindow};
use crate::Station;
use serde_json::Value;
use tracing::{debug, warn};
use crate::connector::ProfileFilter;
use voltsim_messages::v16::{
    CancelReservationRequest, ChangeAvailabilityRequest, ChangeAvailabilityResponse,
    ClearChargingProfileRequest, ClearChargingProfileResponse, DataTransferRequest,
    DataTransferResponse, DiagnosticsStatusNotificationRequest,
    FirmwareStatusNotificationRequest, GetCompositeScheduleRequest, GetCompositeScheduleResponse,
    MeterValuesRequest, RemoteStartTransactionRequest, RemoteStopTransactionRequest,
    ReserveNowRequest, SetChargingProfileRequest, SetChargingProfileResponse,
    TriggerMessageRequest, TriggerMessageResponse, UnlockConnectorRequest,
    UnlockConnectorResponse,
};
use voltsim_messages::OcppAction;
use voltsim_types::v16::{
    AvailabilityStatus, ChargingProfilePurpose, ChargingProfileStatus, ClearChargingProfileStatus,
    DataTransferStatus, DiagnosticsStatus, FirmwareStatus, GetCompositeScheduleStatus,
    MessageTrigger, TriggerMessageStatus,
};
use voltsim_types::{Call, CallError, CallResult, Message};

impl Station {
    /// Service one inbound CALL and produce its CALLRESULT or CALLERROR.
    pub async fn handle_call(&mut self, call: Call) -> Message {
        let unique_id = call.unique_id.clone();
        match self.dispatch(&call).await {
            Ok(payload) => Message::CallResult(CallResult { unique_id, payload }),
            Err(err) => {
                warn!(action = %call.action, %err, "command failed");
                Message::CallError(CallError::new(
                    unique_id,
                    err.call_error_code(),
                    err.to_string(),
                ))
            }
        }
    }

    async fn dispatch(&mut self, call: &Call) -> StationResult<Value> {
        debug!(action = %call.action, unique_id = %call.unique_id, "handling call");
        match call.action.as_str() {
            "RemoteStartTransaction" => {
                self.require(FeatureProfile::Core, "RemoteStartTransaction")?;
                let request: RemoteStartTransactionRequest = parse(call)?;
                to_payload(self.remote_start_transaction(request).await?)
            }
            "RemoteStopTransaction" => {
                self.require(FeatureProfile::Core, "RemoteStopTransaction")?;
                let request: RemoteStopTransactionRequest = parse(call)?;
                to_payload(self.remote_stop_transaction(request).await?)
            }
            "ChangeAvailability" => {
                self.require(FeatureProfile::Core, "ChangeAvailability")?;
                let request: ChangeAvailabilityRequest = parse(call)?;
                to_payload(self.handle_change_availability(request).await?)
            }
            "SetChargingProfile" => {
                self.require(FeatureProfile::SmartCharging, "SetChargingProfile")?;
                let request: SetChargingProfileRequest = parse(call)?;
                to_payload(self.set_charging_profile(request)?)
            }
            "ClearChargingProfile" => {
                self.require(FeatureProfile::SmartCharging, "ClearChargingProfile")?;
                let request: ClearChargingProfileRequest = parse(call)?;
                to_payload(self.clear_charging_profile(request))
            }
            "GetCompositeSchedule" => {
                self.require(FeatureProfile::SmartCharging, "GetCompositeSchedule")?;
                let request: GetCompositeScheduleRequest = parse(call)?;
                to_payload(self.get_composite_schedule(request)?)
            }
            "ReserveNow" => {
                self.require(FeatureProfile::Reservation, "ReserveNow")?;
                let request: ReserveNowRequest = parse(call)?;
                to_payload(self.reserve_now(request).await?)
            }
            "CancelReservation" => {
                self.require(FeatureProfile::Reservation, "CancelReservation")?;
                let request: CancelReservationRequest = parse(call)?;
                to_payload(self.cancel_reservation(request).await?)
            }
            "TriggerMessage" => {
                self.require(FeatureProfile::RemoteTrigger, "TriggerMessage")?;
                let request: TriggerMessageRequest = parse(call)?;
                to_payload(self.trigger_message(request).await?)
            }
            "UnlockConnector" => {
                self.require(FeatureProfile::Core, "UnlockConnector")?;
                let request: UnlockConnectorRequest = parse(call)?;
                let status = self.unlock_connector(request.connector_id).await?;
                to_payload(UnlockConnectorResponse { status })
            }
            "DataTransfer" => {
                self.require(FeatureProfile::Core, "DataTransfer")?;
                let request: DataTransferRequest = parse(call)?;
                to_payload(self.data_transfer(request))
            }
            other => Err(StationError::NotImplemented(other.to_string())),
        }
    }

    fn require(&self, profile: FeatureProfile, action: &'static str) -> StationResult<()> {
        if self.feature_gate().check(profile, action) {
            Ok(())
        } else {
            Err(StationError::FeatureDisabled { action, profile })
        }
    }

    /// Connector 0 addresses the station: the change fans out to every
    /// connector, index 0 included.
    async fn handle_change_availability(
        &mut self,
        request: ChangeAvailabilityRequest,
    ) -> StationResult<ChangeAvailabilityResponse> {
        if !self.ledger.contains(request.connector_id) {
            return Ok(ChangeAvailabilityResponse { status: AvailabilityStatus::Rejected });
        }
        let connector_ids: Vec<u32> = if request.connector_id == 0 {
            (0..=self.ledger.connector_count()).collect()
        } else {
            vec![request.connector_id]
        };
        let status = self.change_availability(&connector_ids, request.kind).await?;
        Ok(ChangeAvailabilityResponse { status })
    }

    /// Install or replace a charging profile on the targeted connector.
    pub fn set_charging_profile(
        &mut self,
        request: SetChargingProfileRequest,
    ) -> StationResult<SetChargingProfileResponse> {
        if !self.ledger.contains(request.connector_id) {
            return Err(StationError::UnknownConnector(request.connector_id));
        }
        let profile = request.cs_charging_profiles;
        // The station-wide power ceiling only lives on connector 0.
        if profile.charging_profile_purpose == ChargingProfilePurpose::ChargePointMaxProfile
            && request.connector_id != 0
        {
            warn!(
                connector_id = request.connector_id,
                "rejecting ChargePointMaxProfile on a physical connector"
            );
            return Ok(SetChargingProfileResponse { status: ChargingProfileStatus::Rejected });
        }
        self.ledger.install_profile(request.connector_id, profile);
        Ok(SetChargingProfileResponse { status: ChargingProfileStatus::Accepted })
    }

    /// Clear profiles matching the filter; without a connector id the
    /// filter sweeps every connector.
    pub fn clear_charging_profile(
        &mut self,
        request: ClearChargingProfileRequest,
    ) -> ClearChargingProfileResponse {
        let filter = ProfileFilter {
            id: request.id,
            purpose: request.charging_profile_purpose,
            stack_level: request.stack_level,
        };
        let cleared = match request.connector_id {
            Some(connector_id) => self.ledger.clear_profiles(connector_id, &filter),
            None => self.ledger.clear_profiles_everywhere(&filter),
        };
        ClearChargingProfileResponse {
            status: if cleared {
                ClearChargingProfileStatus::Accepted
            } else {
                ClearChargingProfileStatus::Unknown
            },
        }
    }

    /// Compose the effective limit curve for a connector over the
    /// requested window, stacking its own profiles with the station-wide
    /// ones on connector 0.
    pub fn get_composite_schedule(
        &mut self,
        request: GetCompositeScheduleRequest,
    ) -> StationResult<GetCompositeScheduleResponse> {
        if !self.ledger.contains(request.connector_id) {
            return Err(StationError::UnknownConnector(request.connector_id));
        }
        let now = self.clock.now();
        let window = ScheduleWindow::starting_at(now, request.duration.into());

        let mut profiles = self
            .ledger
            .get(request.connector_id)
            .map(|connector| connector.charging_profiles.clone())
            .unwrap_or_default();
        if request.connector_id != 0 {
            if let Some(station_wide) = self.ledger.get(0) {
                profiles.extend(station_wide.charging_profiles.iter().cloned());
            }
        }

        match composite_schedule(&profiles, &window, now) {
            Some(schedule) => Ok(GetCompositeScheduleResponse {
                status: GetCompositeScheduleStatus::Accepted,
                connector_id: Some(request.connector_id),
                schedule_start: schedule.start_schedule,
                charging_schedule: Some(schedule),
            }),
            None => Ok(GetCompositeScheduleResponse {
                status: GetCompositeScheduleStatus::Rejected,
                connector_id: None,
                schedule_start: None,
                charging_schedule: None,
            }),
        }
    }

    /// Emit one of the station's own requests on CSMS demand.
    pub async fn trigger_message(
        &mut self,
        request: TriggerMessageRequest,
    ) -> StationResult<TriggerMessageResponse> {
        let connector_id = request.connector_id.unwrap_or(0);
        if !self.ledger.contains(connector_id) {
            return Ok(TriggerMessageResponse { status: TriggerMessageStatus::Rejected });
        }
        match request.requested_message {
            MessageTrigger::BootNotification => {
                self.boot_notification().await?;
            }
            MessageTrigger::Heartbeat => {
                self.heartbeat().await?;
            }
            MessageTrigger::StatusNotification => {
                self.push_status_notification(connector_id).await?;
            }
            MessageTrigger::MeterValues => {
                if connector_id == 0 {
                    return Ok(TriggerMessageResponse {
                        status: TriggerMessageStatus::Rejected,
                    });
                }
                let transaction_id =
                    self.ledger.get(connector_id).and_then(|c| c.transaction_id);
                let interval = self.config().meter_value_sample_interval;
                let meter_value =
                    self.build_meter_value(connector_id, transaction_id, interval, false)?;
                let request = MeterValuesRequest {
                    connector_id,
                    transaction_id,
                    meter_value: vec![meter_value],
                };
                self.send_request(&request).await?;
            }
            MessageTrigger::DiagnosticsStatusNotification => {
                let request =
                    DiagnosticsStatusNotificationRequest { status: DiagnosticsStatus::Idle };
                self.send_request(&request).await?;
            }
            MessageTrigger::FirmwareStatusNotification => {
                let request = FirmwareStatusNotificationRequest { status: FirmwareStatus::Idle };
                self.send_request(&request).await?;
            }
        }
        Ok(TriggerMessageResponse { status: TriggerMessageStatus::Accepted })
    }

    /// Vendor-scoped free-form exchange; only allow-listed vendors are
    /// served.
    pub fn data_transfer(&self, request: DataTransferRequest) -> DataTransferResponse {
        if self
            .config()
            .data_transfer_vendor_ids
            .iter()
            .any(|vendor| vendor == &request.vendor_id)
        {
            DataTransferResponse { status: DataTransferStatus::Accepted, data: request.data }
        } else {
            debug!(vendor_id = %request.vendor_id, "data transfer from unknown vendor");
            DataTransferResponse { status: DataTransferStatus::UnknownVendorId, data: None }
        }
    }
}

fn parse<T: OcppAction>(call: &Call) -> StationResult<T> {
    let request: T = call.payload_as().map_err(|err| StationError::Payload {
        action: call.action.clone(),
        detail: err.to_string(),
    })?;
    request.validate()?;
    Ok(request)
}

fn to_payload<T: serde::Serialize>(response: T) -> StationResult<Value> {
    serde_json::to_value(response)
        .map_err(|err| StationError::Protocol(voltsim_types::OcppError::from(err)))
}
