use thiserror::Error;

use crate::data::{Audience, Coordinate, SHARE_DURATIONS_HOURS};

/// Whether the local user's broadcast is off, being configured, or
/// live on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SharePhase {
    #[default]
    Off,
    Configuring,
    Active,
}

/// Audience choice including the local-only "off" position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Off,
    Friends,
    Public,
}

impl Visibility {
    pub fn audience(&self) -> Option<Audience> {
        match self {
            Visibility::Off => None,
            Visibility::Friends => Some(Audience::Friends),
            Visibility::Public => Some(Audience::Public),
        }
    }
}

/// What kind of position the user is broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShareType {
    #[default]
    Live,
    Static,
}

impl ShareType {
    pub fn wire_name(&self) -> &'static str {
        match self {
            ShareType::Live => "live",
            ShareType::Static => "static",
        }
    }
}

/// Everything the service needs for one `share` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareRequest {
    pub position: Coordinate,
    pub visibility: Audience,
    pub share_type: ShareType,
    pub duration_hours: u32,
}

/// Rejected before any network traffic happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitRejected {
    #[error("turn sharing on before broadcasting")]
    VisibilityOff,
    #[error("pick a point on the map first")]
    NoStaticPosition,
    #[error("your position is not available yet")]
    NoDevicePosition,
}

/// The local user's own broadcast configuration.
///
/// This is a plain state machine; the map view drives it and performs
/// the actual service calls between `prepare_commit` and
/// `confirm_commit` (or `begin_stop` and `confirm_stop`). Nothing in
/// here touches the network, so a failed call simply never confirms
/// and the session is left exactly where it was.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SharingSession {
    visibility: Visibility,
    share_type: ShareType,
    duration_hours: u32,
    static_position: Option<Coordinate>,
    phase: SharePhase,
}

impl SharingSession {
    pub fn new() -> Self {
        Self {
            duration_hours: SHARE_DURATIONS_HOURS[0],
            ..Self::default()
        }
    }

    pub fn phase(&self) -> SharePhase {
        self.phase
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn share_type(&self) -> ShareType {
        self.share_type
    }

    pub fn duration_hours(&self) -> u32 {
        self.duration_hours
    }

    pub fn static_position(&self) -> Option<Coordinate> {
        self.static_position
    }

    /// Change who can see the broadcast. Turning visibility off drops
    /// the whole session back to `Off`; the return value tells the
    /// caller whether a server-side stop is still owed for a
    /// previously active share. Any other change lands in
    /// `Configuring` until the user commits again.
    pub fn set_visibility(&mut self, visibility: Visibility) -> bool {
        let was_active = self.phase == SharePhase::Active;

        self.visibility = visibility;
        if visibility == Visibility::Off {
            self.phase = SharePhase::Off;
            was_active
        } else {
            self.phase = SharePhase::Configuring;
            false
        }
    }

    /// Switch between broadcasting the device position and a pinned
    /// one. Either direction discards a previously picked pin, so a
    /// switch to `Static` always needs a fresh map click.
    pub fn set_type(&mut self, share_type: ShareType) {
        if self.phase == SharePhase::Off {
            return;
        }
        self.share_type = share_type;
        self.static_position = None;
    }

    /// Record the map click that supplies the pinned position.
    /// Ignored unless the session is set to `Static`.
    pub fn select_static_position(&mut self, position: Coordinate) -> bool {
        if self.phase == SharePhase::Off || self.share_type != ShareType::Static {
            return false;
        }
        self.static_position = Some(position);
        true
    }

    /// Abandon a pinned position and go back to broadcasting the
    /// device position. Purely local, no server contact.
    pub fn reset_to_my_location(&mut self) {
        self.share_type = ShareType::Live;
        self.static_position = None;
    }

    pub fn set_duration_hours(&mut self, hours: u32) {
        if SHARE_DURATIONS_HOURS.contains(&hours) {
            self.duration_hours = hours;
        }
    }

    /// Check the commit preconditions and build the share request.
    /// `device_position` backs a `Live` share; a `Static` share needs
    /// a previously selected pin. Failing either check rejects the
    /// commit without any network call.
    pub fn prepare_commit(
        &self,
        device_position: Option<Coordinate>,
    ) -> Result<ShareRequest, CommitRejected> {
        let visibility = self.visibility.audience().ok_or(CommitRejected::VisibilityOff)?;

        let position = match self.share_type {
            ShareType::Live => device_position.ok_or(CommitRejected::NoDevicePosition)?,
            ShareType::Static => self.static_position.ok_or(CommitRejected::NoStaticPosition)?,
        };

        Ok(ShareRequest {
            position,
            visibility,
            share_type: self.share_type,
            duration_hours: self.duration_hours,
        })
    }

    /// The server acknowledged the share.
    pub fn confirm_commit(&mut self) {
        self.phase = SharePhase::Active;
    }

    /// Whether stopping requires a server call at all. `Off` is a
    /// local no-op.
    pub fn begin_stop(&self) -> bool {
        self.phase != SharePhase::Off
    }

    /// The server acknowledged the stop (or there was nothing to
    /// stop).
    pub fn confirm_stop(&mut self) {
        self.visibility = Visibility::Off;
        self.phase = SharePhase::Off;
        self.static_position = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_off() {
        let session = SharingSession::new();

        assert_eq!(session.phase(), SharePhase::Off);
        assert_eq!(session.visibility(), Visibility::Off);
        assert_eq!(session.duration_hours(), 1);
    }

    #[test]
    fn test_visibility_moves_to_configuring() {
        let mut session = SharingSession::new();

        assert!(!session.set_visibility(Visibility::Friends));
        assert_eq!(session.phase(), SharePhase::Configuring);
    }

    #[test]
    fn test_visibility_off_requests_stop_only_when_active() {
        let mut session = SharingSession::new();
        session.set_visibility(Visibility::Public);
        assert!(!session.set_visibility(Visibility::Off));
        assert_eq!(session.phase(), SharePhase::Off);

        session.set_visibility(Visibility::Public);
        session.confirm_commit();
        assert!(session.set_visibility(Visibility::Off));
        assert_eq!(session.phase(), SharePhase::Off);
    }

    #[test]
    fn test_commit_with_visibility_off_is_rejected_locally() {
        let session = SharingSession::new();

        let result = session.prepare_commit(Some(Coordinate::new(1.0, 2.0)));
        assert_eq!(result, Err(CommitRejected::VisibilityOff));
    }

    #[test]
    fn test_scenario_live_share() {
        // Device at (40.0, -73.9), visibility friends, live, 24h.
        let mut session = SharingSession::new();
        session.set_visibility(Visibility::Friends);
        session.set_duration_hours(24);

        let request = session
            .prepare_commit(Some(Coordinate::new(40.0, -73.9)))
            .unwrap();
        assert_eq!(request.position, Coordinate::new(40.0, -73.9));
        assert_eq!(request.visibility, Audience::Friends);
        assert_eq!(request.share_type, ShareType::Live);
        assert_eq!(request.duration_hours, 24);

        session.confirm_commit();
        assert_eq!(session.phase(), SharePhase::Active);
    }

    #[test]
    fn test_failed_share_leaves_session_configuring() {
        let mut session = SharingSession::new();
        session.set_visibility(Visibility::Friends);
        let before = session.clone();

        // The map view only calls confirm_commit on an ack; a failed
        // call never confirms, so nothing may have changed.
        let _ = session.prepare_commit(Some(Coordinate::new(1.0, 1.0))).unwrap();
        assert_eq!(session, before);
        assert_eq!(session.phase(), SharePhase::Configuring);
    }

    #[test]
    fn test_switching_to_static_requires_fresh_pin() {
        let mut session = SharingSession::new();
        session.set_visibility(Visibility::Public);
        session.set_type(ShareType::Static);

        assert_eq!(
            session.prepare_commit(Some(Coordinate::new(1.0, 1.0))),
            Err(CommitRejected::NoStaticPosition)
        );

        assert!(session.select_static_position(Coordinate::new(48.8, 2.3)));
        let request = session.prepare_commit(None).unwrap();
        assert_eq!(request.position, Coordinate::new(48.8, 2.3));
        assert_eq!(request.share_type, ShareType::Static);
    }

    #[test]
    fn test_switching_to_live_discards_pin() {
        let mut session = SharingSession::new();
        session.set_visibility(Visibility::Public);
        session.set_type(ShareType::Static);
        session.select_static_position(Coordinate::new(48.8, 2.3));

        session.set_type(ShareType::Live);
        assert_eq!(session.static_position(), None);

        // Back to static: the old pin must not resurface.
        session.set_type(ShareType::Static);
        assert_eq!(session.static_position(), None);
        assert_eq!(
            session.prepare_commit(Some(Coordinate::new(1.0, 1.0))),
            Err(CommitRejected::NoStaticPosition)
        );
    }

    #[test]
    fn test_pin_ignored_when_type_is_live() {
        let mut session = SharingSession::new();
        session.set_visibility(Visibility::Public);

        assert!(!session.select_static_position(Coordinate::new(48.8, 2.3)));
        assert_eq!(session.static_position(), None);
    }

    #[test]
    fn test_reset_to_my_location_is_local() {
        let mut session = SharingSession::new();
        session.set_visibility(Visibility::Public);
        session.set_type(ShareType::Static);
        session.select_static_position(Coordinate::new(48.8, 2.3));

        session.reset_to_my_location();
        assert_eq!(session.share_type(), ShareType::Live);
        assert_eq!(session.static_position(), None);
        // Still configuring; nothing was stopped or committed.
        assert_eq!(session.phase(), SharePhase::Configuring);
    }

    #[test]
    fn test_stop_when_off_is_a_no_op() {
        let mut session = SharingSession::new();

        assert!(!session.begin_stop());
        session.confirm_stop();
        assert_eq!(session.phase(), SharePhase::Off);
    }

    #[test]
    fn test_stop_after_active_clears_everything() {
        let mut session = SharingSession::new();
        session.set_visibility(Visibility::Friends);
        session.set_type(ShareType::Static);
        session.select_static_position(Coordinate::new(1.0, 2.0));
        session.confirm_commit();

        assert!(session.begin_stop());
        session.confirm_stop();
        assert_eq!(session.phase(), SharePhase::Off);
        assert_eq!(session.visibility(), Visibility::Off);
        assert_eq!(session.static_position(), None);
    }

    #[test]
    fn test_unknown_duration_is_ignored() {
        let mut session = SharingSession::new();
        session.set_duration_hours(6);
        session.set_duration_hours(7);

        assert_eq!(session.duration_hours(), 6);
    }
}
