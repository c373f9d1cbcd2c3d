use chrono::DateTime;
use serde::Deserialize;

/// Durations (in whole hours) a share can be committed for.
pub const SHARE_DURATIONS_HOURS: [u32; 5] = [1, 3, 6, 12, 24];

/// A point on the map in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Discriminator for what a shared location actually is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Live,
    Static,
    Post,
    Shoutout,
}

impl LocationKind {
    /// Name used in wire formats (`typeFilter`, share body).
    pub fn wire_name(&self) -> &'static str {
        match self {
            LocationKind::Live => "live",
            LocationKind::Static => "static",
            LocationKind::Post => "post",
            LocationKind::Shoutout => "shoutout",
        }
    }

    /// Human label shown in the detail popover.
    pub fn label(&self) -> &'static str {
        match self {
            LocationKind::Live => "Live location",
            LocationKind::Static => "Pinned location",
            LocationKind::Post => "Post",
            LocationKind::Shoutout => "Shoutout",
        }
    }
}

/// Who may see a shared position. "Off" never reaches the wire; it is
/// a local state of the sharing session, not an audience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Friends,
    Public,
}

impl Audience {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Audience::Friends => "friends",
            Audience::Public => "public",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Owner of a remote location record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Embedded summary of a location-tagged post.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default = "default_media_kind")]
    pub media_kind: MediaKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub like_count: u32,
    #[serde(default)]
    pub comment_count: u32,
}

fn default_media_kind() -> MediaKind {
    MediaKind::Image
}

/// One remotely stored shared position, exactly as the service returns
/// it. Held only as an immutable snapshot; every fetch replaces the
/// whole set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub id: String,
    #[serde(default)]
    pub user: Option<RecordUser>,
    pub latitude: f64,
    pub longitude: f64,
    pub kind: LocationKind,
    #[serde(default)]
    pub audience: Option<Audience>,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub post: Option<PostSummary>,
    #[serde(default)]
    pub shoutout: Option<String>,
}

/// Kind-specific payload carried by a marker. Matching on this at
/// render time replaces optional-field checks on the raw record.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerPayload {
    Live,
    Static,
    Post(PostSummary),
    Shoutout(String),
}

/// The renderable projection of one `LocationRecord`.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: String,
    pub position: Coordinate,
    pub user: RecordUser,
    pub is_me: bool,
    pub updated_at: String,
    pub address: Option<String>,
    pub payload: MarkerPayload,
}

impl Marker {
    pub fn kind(&self) -> LocationKind {
        match self.payload {
            MarkerPayload::Live => LocationKind::Live,
            MarkerPayload::Static => LocationKind::Static,
            MarkerPayload::Post(_) => LocationKind::Post,
            MarkerPayload::Shoutout(_) => LocationKind::Shoutout,
        }
    }

    /// Post identity behind the "view post" action, when there is one.
    pub fn post_id(&self) -> Option<&str> {
        match &self.payload {
            MarkerPayload::Post(post) => Some(post.id.as_str()),
            _ => None,
        }
    }
}

/// Which slice of nearby locations the map is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapFilter {
    #[default]
    All,
    Friends,
    Shared,
    Post,
    Shoutout,
}

impl MapFilter {
    pub const ALL: [MapFilter; 5] = [
        MapFilter::All,
        MapFilter::Friends,
        MapFilter::Shared,
        MapFilter::Post,
        MapFilter::Shoutout,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MapFilter::All => "Everything",
            MapFilter::Friends => "Friends",
            MapFilter::Shared => "Shared locations",
            MapFilter::Post => "Posts",
            MapFilter::Shoutout => "Shoutouts",
        }
    }
}

/// Map-local filter settings. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    pub active: MapFilter,
    pub radius_km: f64,
}

impl FilterState {
    pub fn new(radius_km: f64) -> Self {
        Self {
            active: MapFilter::All,
            radius_km,
        }
    }
}

/// Currently highlighted marker, if any. Drives the detail popover.
#[derive(Debug, Default)]
pub struct SelectionState {
    selected: Option<String>,
}

impl SelectionState {
    pub fn select(&mut self, marker_id: &str) {
        self.selected = Some(marker_id.to_string());
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }
}

/// Time window for the historical post map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimePeriod {
    Day,
    Month,
    Year,
    #[default]
    All,
}

impl TimePeriod {
    pub const ALL: [TimePeriod; 4] = [
        TimePeriod::Day,
        TimePeriod::Month,
        TimePeriod::Year,
        TimePeriod::All,
    ];

    pub fn wire_name(&self) -> &'static str {
        match self {
            TimePeriod::Day => "day",
            TimePeriod::Month => "month",
            TimePeriod::Year => "year",
            TimePeriod::All => "all",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimePeriod::Day => "Past day",
            TimePeriod::Month => "Past month",
            TimePeriod::Year => "Past year",
            TimePeriod::All => "All time",
        }
    }
}

/// Humanize an RFC 3339 timestamp into "N hours ago" style text.
/// Falls back to the raw string when it does not parse.
pub fn format_relative_time(raw: &str) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(raw) else {
        return raw.to_string();
    };

    let duration = chrono::Utc::now().signed_duration_since(parsed);

    if duration.num_days() > 0 {
        format!("{} days ago", duration.num_days())
    } else if duration.num_hours() > 0 {
        format!("{} hours ago", duration.num_hours())
    } else if duration.num_minutes() > 0 {
        format!("{} minutes ago", duration.num_minutes())
    } else {
        "Just now".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_record() {
        let json = r#"{
            "id": "loc-1",
            "user": {"id": "u1", "username": "ada", "fullName": "Ada L.", "avatarUrl": "https://cdn/avatar.png"},
            "latitude": 40.0,
            "longitude": -73.9,
            "kind": "post",
            "updatedAt": "2026-08-01T12:00:00Z",
            "address": "5th Avenue",
            "post": {"id": "p9", "mediaUrl": "https://cdn/p9.mp4", "mediaKind": "video", "content": "hello", "likeCount": 3, "commentCount": 1}
        }"#;

        let record: LocationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind, LocationKind::Post);
        assert_eq!(record.user.as_ref().unwrap().username, "ada");
        assert_eq!(record.audience, None);
        let post = record.post.unwrap();
        assert_eq!(post.media_kind, MediaKind::Video);
        assert_eq!(post.like_count, 3);
    }

    #[test]
    fn test_decode_minimal_record() {
        let json = r#"{"id": "loc-2", "latitude": 1.0, "longitude": 2.0, "kind": "live", "audience": "friends"}"#;

        let record: LocationRecord = serde_json::from_str(json).unwrap();
        assert!(record.user.is_none());
        assert_eq!(record.audience, Some(Audience::Friends));
        assert_eq!(record.updated_at, "");
        assert!(record.post.is_none());
        assert!(record.shoutout.is_none());
    }

    #[test]
    fn test_unknown_kind_fails_to_decode() {
        let json = r#"{"id": "loc-3", "latitude": 1.0, "longitude": 2.0, "kind": "teleport"}"#;

        assert!(serde_json::from_str::<LocationRecord>(json).is_err());
    }

    #[test]
    fn test_marker_kind_follows_payload() {
        let marker = Marker {
            id: "m1".to_string(),
            position: Coordinate::new(0.0, 0.0),
            user: RecordUser {
                id: "u1".to_string(),
                username: "ada".to_string(),
                full_name: String::new(),
                avatar_url: None,
            },
            is_me: false,
            updated_at: String::new(),
            address: None,
            payload: MarkerPayload::Shoutout("free coffee".to_string()),
        };

        assert_eq!(marker.kind(), LocationKind::Shoutout);
        assert_eq!(marker.post_id(), None);
    }

    #[test]
    fn test_selection_lifecycle() {
        let mut selection = SelectionState::default();
        assert_eq!(selection.selected(), None);

        selection.select("m1");
        assert_eq!(selection.selected(), Some("m1"));

        selection.clear();
        assert_eq!(selection.selected(), None);
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = chrono::Utc::now();

        let minutes = (now - chrono::Duration::minutes(5)).to_rfc3339();
        assert_eq!(format_relative_time(&minutes), "5 minutes ago");

        let hours = (now - chrono::Duration::hours(3)).to_rfc3339();
        assert_eq!(format_relative_time(&hours), "3 hours ago");

        let days = (now - chrono::Duration::days(2)).to_rfc3339();
        assert_eq!(format_relative_time(&days), "2 days ago");

        let fresh = now.to_rfc3339();
        assert_eq!(format_relative_time(&fresh), "Just now");
    }

    #[test]
    fn test_relative_time_falls_back_to_raw() {
        assert_eq!(format_relative_time("yesterday-ish"), "yesterday-ish");
    }
}
