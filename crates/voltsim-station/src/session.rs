//! Session coordinator: the connector state machine and the transaction
//! lifecycle behind the remote supervisory commands.
//!
//! State transitions are serialized through this module; every transition
//! evicts an expired reservation first and pushes a `StatusNotification`
//! when the status actually changes.

use crate::error::{StationError, StationResult};
use crate::meter::build_transaction_data_meter_values;
use crate::Station;
use tracing::{debug, info, warn};
use voltsim_messages::v16::{
    AuthorizeRequest, CancelReservationRequest, CancelReservationResponse,
    RemoteStartTransactionRequest, RemoteStartTransactionResponse, RemoteStopTransactionRequest,
    RemoteStopTransactionResponse, ReserveNowRequest, ReserveNowResponse, StartTransactionRequest,
    StatusNotificationRequest, StopTransactionRequest,
};
use voltsim_types::v16::{
    AuthorizationStatus, AvailabilityStatus, AvailabilityType, CancelReservationStatus,
    ChargePointErrorCode, ChargePointStatus, ChargingProfilePurpose, IdTagInfo, Reason,
    RemoteStartStopStatus, ReservationStatus, UnlockStatus,
};

impl Station {
    /// Report a connector's current status to the CSMS.
    pub(crate) async fn push_status_notification(&self, connector_id: u32) -> StationResult<()> {
        let status = self
            .ledger
            .get(connector_id)
            .map(|connector| connector.status)
            .ok_or(StationError::UnknownConnector(connector_id))?;
        let request = StatusNotificationRequest {
            connector_id,
            error_code: ChargePointErrorCode::NoError,
            info: None,
            status,
            timestamp: Some(self.clock.now()),
            vendor_id: None,
            vendor_error_code: None,
        };
        self.send_request(&request).await?;
        Ok(())
    }

    /// Move a connector to a new status and notify the CSMS. Expired
    /// reservations are evicted before the transition; an unchanged status
    /// is not re-announced.
    pub(crate) async fn transition(
        &mut self,
        connector_id: u32,
        status: ChargePointStatus,
    ) -> StationResult<()> {
        let now = self.clock.now();
        self.ledger.evict_expired_reservation(connector_id, now);
        if self.ledger.get(connector_id).map(|connector| connector.status) == Some(status) {
            return Ok(());
        }
        self.ledger.set_status(connector_id, status);
        self.push_status_notification(connector_id).await
    }

    /// True iff a non-expired reservation for this id tag sits on the
    /// connector, or on the station-level connector 0.
    pub fn has_reservation(&self, connector_id: u32, id_tag: &str) -> bool {
        let now = self.clock.now();
        let held_for = |id: u32| {
            self.ledger.get(id).is_some_and(|connector| {
                connector.status == ChargePointStatus::Reserved
                    && connector
                        .reservation
                        .as_ref()
                        .is_some_and(|r| !r.expired_at(now) && r.id_tag == id_tag)
            })
        };
        held_for(connector_id) || held_for(0)
    }

    /// Start a transaction on behalf of the CSMS.
    pub async fn remote_start_transaction(
        &mut self,
        request: RemoteStartTransactionRequest,
    ) -> StationResult<RemoteStartTransactionResponse> {
        let rejected =
            RemoteStartTransactionResponse { status: RemoteStartStopStatus::Rejected };

        let Some(connector_id) = self.pick_start_connector(request.connector_id) else {
            warn!(requested = ?request.connector_id, "remote start: no connector can take a session");
            return Ok(rejected);
        };

        // A profile attached to a remote start must be transaction-scoped.
        if let Some(profile) = &request.charging_profile {
            if profile.charging_profile_purpose != ChargingProfilePurpose::TxProfile {
                warn!(connector_id, purpose = ?profile.charging_profile_purpose, "remote start: profile purpose must be TxProfile");
                return Ok(rejected);
            }
        }

        // A reserved connector only serves its holder.
        let reserved = self
            .ledger
            .get(connector_id)
            .is_some_and(|connector| connector.status == ChargePointStatus::Reserved);
        if reserved && !self.has_reservation(connector_id, &request.id_tag) {
            info!(connector_id, id_tag = %request.id_tag, "remote start: connector reserved for another id tag");
            return Ok(rejected);
        }

        let authorize = AuthorizeRequest { id_tag: request.id_tag.clone() };
        let authorization = self.send_request(&authorize).await?;
        if authorization.id_tag_info.status != AuthorizationStatus::Accepted {
            info!(connector_id, id_tag = %request.id_tag, status = ?authorization.id_tag_info.status, "remote start: id tag refused");
            return Ok(rejected);
        }

        self.transition(connector_id, ChargePointStatus::Preparing).await?;
        if let Some(profile) = request.charging_profile {
            self.ledger.install_profile(connector_id, profile);
        }

        let started = self.start_transaction_on_connector(connector_id, &request.id_tag).await?;
        Ok(RemoteStartTransactionResponse {
            status: if started {
                RemoteStartStopStatus::Accepted
            } else {
                RemoteStartStopStatus::Rejected
            },
        })
    }

    /// Resolve the connector a remote start should land on.
    fn pick_start_connector(&mut self, requested: Option<u32>) -> Option<u32> {
        let now = self.clock.now();
        let explicit = matches!(requested, Some(id) if id != 0);
        let candidates: Vec<u32> = match requested {
            Some(0) | None => self.ledger.connector_ids().collect(),
            Some(id) if self.ledger.contains(id) => vec![id],
            Some(_) => return None,
        };
        for connector_id in candidates {
            self.ledger.evict_expired_reservation(connector_id, now);
            let Some(connector) = self.ledger.get(connector_id) else { continue };
            if connector.availability == AvailabilityType::Inoperative
                || connector.transaction_started
            {
                continue;
            }
            match connector.status {
                ChargePointStatus::Available | ChargePointStatus::Preparing => {
                    return Some(connector_id)
                }
                // A reserved connector is only a candidate when it was
                // addressed directly; the caller verifies the holder.
                ChargePointStatus::Reserved if explicit => return Some(connector_id),
                _ => continue,
            }
        }
        None
    }

    /// Begin the transaction: send `StartTransaction`, record the returned
    /// id, and move to `Charging`. Returns false when the CSMS refuses.
    pub(crate) async fn start_transaction_on_connector(
        &mut self,
        connector_id: u32,
        id_tag: &str,
    ) -> StationResult<bool> {
        let (meter_start_wh, reservation_id) = {
            let connector = self
                .ledger
                .get(connector_id)
                .ok_or(StationError::UnknownConnector(connector_id))?;
            if connector.status == ChargePointStatus::Reserved
                && !self.has_reservation(connector_id, id_tag)
            {
                info!(connector_id, id_tag, "start refused: reserved for another id tag");
                return Ok(false);
            }
            (
                connector.energy_active_import_register,
                connector.reservation.as_ref().map(|r| r.reservation_id),
            )
        };

        let request = StartTransactionRequest {
            connector_id,
            id_tag: id_tag.to_string(),
            meter_start: meter_start_wh.round() as i32,
            reservation_id,
            timestamp: self.clock.now(),
        };
        let response = self.send_request(&request).await?;

        if response.id_tag_info.status == AuthorizationStatus::Accepted {
            self.ledger.begin_transaction(connector_id, response.transaction_id, id_tag);
            self.transition(connector_id, ChargePointStatus::Charging).await?;
            info!(connector_id, transaction_id = response.transaction_id, "transaction started");
            Ok(true)
        } else {
            warn!(connector_id, status = ?response.id_tag_info.status, "start transaction refused by CSMS");
            self.transition(connector_id, ChargePointStatus::Available).await?;
            Ok(false)
        }
    }

    /// Stop a transaction on behalf of the CSMS. Accepted iff the stop
    /// response's id tag info reports `Accepted` (or carries none).
    pub async fn remote_stop_transaction(
        &mut self,
        request: RemoteStopTransactionRequest,
    ) -> StationResult<RemoteStopTransactionResponse> {
        let Some(connector_id) = self.ledger.find_by_transaction(request.transaction_id) else {
            warn!(transaction_id = request.transaction_id, "remote stop: unknown transaction");
            return Ok(RemoteStopTransactionResponse { status: RemoteStartStopStatus::Rejected });
        };

        self.transition(connector_id, ChargePointStatus::Finishing).await?;
        let id_tag_info =
            self.stop_transaction_on_connector(connector_id, Reason::Remote).await?;
        let accepted =
            id_tag_info.map_or(true, |info| info.status == AuthorizationStatus::Accepted);
        Ok(RemoteStopTransactionResponse {
            status: if accepted {
                RemoteStartStopStatus::Accepted
            } else {
                RemoteStartStopStatus::Rejected
            },
        })
    }

    /// Close the transaction: emit `StopTransaction` with boundary meter
    /// values, settle the ledger, and release the connector (or take it
    /// out of service when an availability change was scheduled).
    pub(crate) async fn stop_transaction_on_connector(
        &mut self,
        connector_id: u32,
        reason: Reason,
    ) -> StationResult<Option<IdTagInfo>> {
        let (transaction_id, id_tag, meter_start_wh, meter_stop_wh) = {
            let connector = self
                .ledger
                .get(connector_id)
                .ok_or(StationError::UnknownConnector(connector_id))?;
            if !connector.transaction_started {
                return Err(StationError::NoTransaction { connector_id });
            }
            let transaction_id = connector
                .transaction_id
                .ok_or(StationError::NoTransaction { connector_id })?;
            (
                transaction_id,
                connector.id_tag.clone(),
                connector.transaction_meter_start.unwrap_or(0.0),
                connector.energy_active_import_register,
            )
        };

        let begin = self.build_transaction_begin_meter_value(connector_id, meter_start_wh);
        let end = self.build_transaction_end_meter_value(connector_id, meter_stop_wh);
        let request = StopTransactionRequest {
            id_tag,
            meter_stop: meter_stop_wh.round() as i32,
            timestamp: self.clock.now(),
            transaction_id,
            reason: Some(reason),
            transaction_data: Some(build_transaction_data_meter_values(begin, end)),
        };
        let response = self.send_request(&request).await?;

        self.ledger.end_transaction(connector_id);
        let out_of_service = self
            .ledger
            .get(connector_id)
            .map(|connector| connector.availability == AvailabilityType::Inoperative)
            .unwrap_or(false);
        let released = if out_of_service {
            ChargePointStatus::Unavailable
        } else {
            ChargePointStatus::Available
        };
        self.transition(connector_id, released).await?;
        info!(connector_id, transaction_id, ?reason, "transaction stopped");

        Ok(response.id_tag_info)
    }

    /// Apply an availability change to a set of connectors. Connectors
    /// with a live transaction answer `Scheduled` and change status at
    /// transaction end; everyone's availability is set immediately.
    pub async fn change_availability(
        &mut self,
        connector_ids: &[u32],
        kind: AvailabilityType,
    ) -> StationResult<AvailabilityStatus> {
        let mut any_scheduled = false;
        for &connector_id in connector_ids {
            let Some(connector) = self.ledger.get_mut(connector_id) else { continue };
            connector.availability = kind;
            if connector.transaction_started {
                connector.scheduled_availability = Some(kind);
                debug!(connector_id, ?kind, "availability change scheduled for transaction end");
                any_scheduled = true;
                continue;
            }
            match kind {
                AvailabilityType::Inoperative => {
                    self.transition(connector_id, ChargePointStatus::Unavailable).await?;
                }
                AvailabilityType::Operative => {
                    // Only connectors actually out of service move; an
                    // operative connector keeps its current status.
                    if self.ledger.get(connector_id).map(|c| c.status)
                        == Some(ChargePointStatus::Unavailable)
                    {
                        self.transition(connector_id, ChargePointStatus::Available).await?;
                    }
                }
            }
        }
        Ok(if any_scheduled { AvailabilityStatus::Scheduled } else { AvailabilityStatus::Accepted })
    }

    /// Hold a connector (or the whole station via connector 0) for an id
    /// tag until the expiry date.
    pub async fn reserve_now(
        &mut self,
        request: ReserveNowRequest,
    ) -> StationResult<ReserveNowResponse> {
        let connector_id = request.connector_id;
        if !self.ledger.contains(connector_id) {
            return Err(StationError::UnknownConnector(connector_id));
        }
        let now = self.clock.now();
        self.ledger.evict_expired_reservation(connector_id, now);
        if request.expiry_date <= now {
            return Ok(ReserveNowResponse { status: ReservationStatus::Rejected });
        }

        // A reservation with a known id moves to the new connector.
        if let Some(previous) = self.ledger.find_reservation(request.reservation_id) {
            if previous != connector_id {
                self.ledger.remove_reservation(previous);
                if self.ledger.get(previous).map(|c| c.status)
                    == Some(ChargePointStatus::Reserved)
                {
                    self.transition(previous, ChargePointStatus::Available).await?;
                }
            }
        }

        let Some(connector) = self.ledger.get(connector_id) else {
            return Err(StationError::UnknownConnector(connector_id));
        };
        if connector.availability == AvailabilityType::Inoperative {
            return Ok(ReserveNowResponse { status: ReservationStatus::Unavailable });
        }
        let same_reservation = connector
            .reservation
            .as_ref()
            .map(|r| r.reservation_id == request.reservation_id)
            .unwrap_or(true);

        let status = match connector.status {
            ChargePointStatus::Faulted => ReservationStatus::Faulted,
            ChargePointStatus::Unavailable => ReservationStatus::Unavailable,
            ChargePointStatus::Reserved if !same_reservation => ReservationStatus::Occupied,
            ChargePointStatus::Available | ChargePointStatus::Reserved => {
                self.ledger.set_reservation(
                    connector_id,
                    crate::Reservation {
                        reservation_id: request.reservation_id,
                        connector_id,
                        id_tag: request.id_tag.clone(),
                        expiry_date: request.expiry_date,
                    },
                );
                self.transition(connector_id, ChargePointStatus::Reserved).await?;
                info!(connector_id, reservation_id = request.reservation_id, id_tag = %request.id_tag, "connector reserved");
                ReservationStatus::Accepted
            }
            _ => ReservationStatus::Occupied,
        };
        Ok(ReserveNowResponse { status })
    }

    /// Release a reservation by id.
    pub async fn cancel_reservation(
        &mut self,
        request: CancelReservationRequest,
    ) -> StationResult<CancelReservationResponse> {
        match self.ledger.find_reservation(request.reservation_id) {
            Some(connector_id) => {
                self.ledger.remove_reservation(connector_id);
                if self.ledger.get(connector_id).map(|c| c.status)
                    == Some(ChargePointStatus::Reserved)
                {
                    self.transition(connector_id, ChargePointStatus::Available).await?;
                }
                info!(connector_id, reservation_id = request.reservation_id, "reservation cancelled");
                Ok(CancelReservationResponse { status: CancelReservationStatus::Accepted })
            }
            None => Ok(CancelReservationResponse { status: CancelReservationStatus::Rejected }),
        }
    }

    /// Unlock a connector, stopping any live transaction first.
    pub async fn unlock_connector(&mut self, connector_id: u32) -> StationResult<UnlockStatus> {
        if connector_id == 0 || !self.ledger.contains(connector_id) {
            return Ok(UnlockStatus::UnlockFailed);
        }
        if self.ledger.get(connector_id).is_some_and(|c| c.transaction_started) {
            self.transition(connector_id, ChargePointStatus::Finishing).await?;
            self.stop_transaction_on_connector(connector_id, Reason::UnlockCommand).await?;
        }
        Ok(UnlockStatus::Unlocked)
    }
}
