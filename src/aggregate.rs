use tracing::debug;

use crate::data::{
    Audience, Coordinate, LocationKind, LocationRecord, MapFilter, Marker, MarkerPayload,
    TimePeriod,
};

/// Wider than the planet; turns the radius constraint off for the
/// historical post map.
pub const UNBOUNDED_RADIUS_KM: f64 = 40_075.0;

/// One fully resolved nearby-locations query. Everything that affects
/// the request lives here so the planner can diff consecutive queries.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyQuery {
    pub center: Coordinate,
    pub radius_km: f64,
    pub target_user_id: Option<String>,
    pub time_period: Option<TimePeriod>,
    pub type_filter: Option<Vec<LocationKind>>,
    pub audience_filter: Option<Audience>,
}

impl NearbyQuery {
    /// Query for the live map. The map filter becomes server-side
    /// parameters; the pipeline itself never filters by kind or
    /// audience.
    pub fn for_filter(center: Coordinate, radius_km: f64, filter: MapFilter) -> Self {
        let (type_filter, audience_filter) = match filter {
            MapFilter::All => (None, None),
            MapFilter::Friends => (
                Some(vec![LocationKind::Live, LocationKind::Static]),
                Some(Audience::Friends),
            ),
            MapFilter::Shared => (Some(vec![LocationKind::Live, LocationKind::Static]), None),
            MapFilter::Post => (Some(vec![LocationKind::Post]), None),
            MapFilter::Shoutout => (Some(vec![LocationKind::Shoutout]), None),
        };

        Self {
            center,
            radius_km,
            target_user_id: None,
            time_period: None,
            type_filter,
            audience_filter,
        }
    }

    /// Query for the historical post map: one user, posts only, no
    /// effective radius limit.
    pub fn for_user_posts(center: Coordinate, target_user_id: &str, period: TimePeriod) -> Self {
        Self {
            center,
            radius_km: UNBOUNDED_RADIUS_KM,
            target_user_id: Some(target_user_id.to_string()),
            time_period: Some(period),
            type_filter: Some(vec![LocationKind::Post]),
            audience_filter: None,
        }
    }

    /// Encode as the `/location/shared` query string. Absent filters
    /// are omitted entirely; the service treats omission as "no
    /// constraint".
    pub fn query_string(&self) -> String {
        let mut query = format!(
            "lat={}&lon={}&radius={}",
            self.center.latitude, self.center.longitude, self.radius_km
        );

        if let Some(ref target) = self.target_user_id {
            query.push_str("&targetUserId=");
            query.push_str(&urlencoding::encode(target));
        }
        if let Some(period) = self.time_period {
            query.push_str("&timePeriod=");
            query.push_str(period.wire_name());
        }
        if let Some(ref kinds) = self.type_filter {
            let joined: Vec<&str> = kinds.iter().map(|k| k.wire_name()).collect();
            query.push_str("&typeFilter=");
            query.push_str(&joined.join(","));
        }
        if let Some(audience) = self.audience_filter {
            query.push_str("&audienceFilter=");
            query.push_str(audience.wire_name());
        }

        query
    }
}

/// Decides when a fetch is actually issued and which response is
/// allowed to land.
///
/// Consecutive identical queries collapse into one fetch; every issued
/// fetch gets a monotonically increasing sequence number and only the
/// latest number may replace state, so a slow response that was
/// overtaken by a newer fetch is discarded on arrival instead of
/// flashing stale markers onto the map.
#[derive(Debug, Default)]
pub struct FetchPlanner {
    last: Option<NearbyQuery>,
    seq: u64,
}

impl FetchPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a sequence number when `query` differs from the last
    /// issued one, `None` when there is nothing new to fetch.
    pub fn plan(&mut self, query: &NearbyQuery) -> Option<u64> {
        if self.last.as_ref() == Some(query) {
            debug!("fetch skipped, query unchanged");
            return None;
        }
        Some(self.force(query))
    }

    /// Issue unconditionally, e.g. to refresh after a share or stop
    /// was acknowledged.
    pub fn force(&mut self, query: &NearbyQuery) -> u64 {
        self.last = Some(query.clone());
        self.seq += 1;
        self.seq
    }

    /// Whether a response carrying `seq` is still the newest one.
    pub fn accept(&self, seq: u64) -> bool {
        seq == self.seq
    }
}

/// Project a fetched snapshot onto renderable markers.
///
/// Records without a user are malformed and skipped, as are records
/// whose kind-specific payload is missing; one bad record must not
/// blank the whole map. The viewer's own live record is suppressed
/// because the self indicator already shows it. Order is preserved.
pub fn aggregate(records: &[LocationRecord], viewer_id: &str) -> Vec<Marker> {
    let mut markers = Vec::with_capacity(records.len());
    let mut dropped = 0usize;

    for record in records {
        let Some(user) = record.user.clone() else {
            dropped += 1;
            continue;
        };

        let is_me = user.id == viewer_id;
        if is_me && record.kind == LocationKind::Live {
            continue;
        }

        let payload = match record.kind {
            LocationKind::Live => MarkerPayload::Live,
            LocationKind::Static => MarkerPayload::Static,
            LocationKind::Post => match record.post.clone() {
                Some(post) => MarkerPayload::Post(post),
                None => {
                    dropped += 1;
                    continue;
                }
            },
            LocationKind::Shoutout => match record.shoutout.clone() {
                Some(text) => MarkerPayload::Shoutout(text),
                None => {
                    dropped += 1;
                    continue;
                }
            },
        };

        markers.push(Marker {
            id: record.id.clone(),
            position: Coordinate::new(record.latitude, record.longitude),
            user,
            is_me,
            updated_at: record.updated_at.clone(),
            address: record.address.clone(),
            payload,
        });
    }

    if dropped > 0 {
        debug!("dropped {} malformed location records", dropped);
    }
    markers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PostSummary, RecordUser};

    fn user(id: &str) -> Option<RecordUser> {
        Some(RecordUser {
            id: id.to_string(),
            username: format!("user-{id}"),
            full_name: String::new(),
            avatar_url: None,
        })
    }

    fn record(id: &str, owner: Option<RecordUser>, kind: LocationKind) -> LocationRecord {
        LocationRecord {
            id: id.to_string(),
            user: owner,
            latitude: 10.0,
            longitude: 20.0,
            kind,
            audience: None,
            updated_at: String::new(),
            address: None,
            post: match kind {
                LocationKind::Post => Some(PostSummary {
                    id: format!("post-{id}"),
                    media_url: None,
                    media_kind: crate::data::MediaKind::Image,
                    content: String::new(),
                    like_count: 0,
                    comment_count: 0,
                }),
                _ => None,
            },
            shoutout: match kind {
                LocationKind::Shoutout => Some("over here".to_string()),
                _ => None,
            },
        }
    }

    #[test]
    fn test_own_live_record_is_suppressed() {
        let records = vec![
            record("a", user("me"), LocationKind::Live),
            record("b", user("other"), LocationKind::Post),
            record("c", user("other2"), LocationKind::Shoutout),
        ];

        let markers = aggregate(&records, "me");

        assert_eq!(markers.len(), 2);
        assert!(markers.iter().all(|m| !(m.is_me && m.kind() == LocationKind::Live)));
        assert_eq!(markers[0].kind(), LocationKind::Post);
        assert_eq!(markers[1].kind(), LocationKind::Shoutout);
    }

    #[test]
    fn test_own_static_record_survives() {
        let records = vec![record("a", user("me"), LocationKind::Static)];

        let markers = aggregate(&records, "me");

        assert_eq!(markers.len(), 1);
        assert!(markers[0].is_me);
    }

    #[test]
    fn test_userless_record_is_dropped() {
        let records = vec![
            record("a", None, LocationKind::Live),
            record("b", user("other"), LocationKind::Live),
        ];

        let markers = aggregate(&records, "me");

        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].id, "b");
    }

    #[test]
    fn test_kind_without_payload_is_dropped() {
        let mut broken_post = record("a", user("other"), LocationKind::Post);
        broken_post.post = None;
        let mut broken_shoutout = record("b", user("other"), LocationKind::Shoutout);
        broken_shoutout.shoutout = None;
        let records = vec![broken_post, broken_shoutout, record("c", user("other"), LocationKind::Live)];

        let markers = aggregate(&records, "me");

        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].id, "c");
    }

    #[test]
    fn test_output_count_accounting() {
        // 1 own-live + 1 userless + 4 good records.
        let records = vec![
            record("a", user("me"), LocationKind::Live),
            record("b", None, LocationKind::Live),
            record("c", user("u1"), LocationKind::Live),
            record("d", user("u2"), LocationKind::Static),
            record("e", user("u3"), LocationKind::Post),
            record("f", user("u4"), LocationKind::Shoutout),
        ];

        let markers = aggregate(&records, "me");

        assert!(markers.len() <= records.len());
        assert_eq!(markers.len(), records.len() - 1 - 1);
        // Insertion order preserved.
        let ids: Vec<&str> = markers.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d", "e", "f"]);
    }

    #[test]
    fn test_filter_to_query_parameters() {
        let center = Coordinate::new(40.0, -73.9);

        let all = NearbyQuery::for_filter(center, 25.0, MapFilter::All);
        assert_eq!(all.query_string(), "lat=40&lon=-73.9&radius=25");

        let friends = NearbyQuery::for_filter(center, 25.0, MapFilter::Friends);
        assert_eq!(
            friends.query_string(),
            "lat=40&lon=-73.9&radius=25&typeFilter=live,static&audienceFilter=friends"
        );

        let shared = NearbyQuery::for_filter(center, 25.0, MapFilter::Shared);
        assert_eq!(
            shared.query_string(),
            "lat=40&lon=-73.9&radius=25&typeFilter=live,static"
        );

        let posts = NearbyQuery::for_filter(center, 25.0, MapFilter::Post);
        assert_eq!(posts.query_string(), "lat=40&lon=-73.9&radius=25&typeFilter=post");

        let shoutouts = NearbyQuery::for_filter(center, 25.0, MapFilter::Shoutout);
        assert_eq!(
            shoutouts.query_string(),
            "lat=40&lon=-73.9&radius=25&typeFilter=shoutout"
        );
    }

    #[test]
    fn test_user_post_query() {
        let query = NearbyQuery::for_user_posts(Coordinate::new(0.0, 0.0), "u 1", TimePeriod::Year);

        assert_eq!(
            query.query_string(),
            format!("lat=0&lon=0&radius={UNBOUNDED_RADIUS_KM}&targetUserId=u%201&timePeriod=year&typeFilter=post")
        );
    }

    #[test]
    fn test_planner_skips_identical_queries() {
        let mut planner = FetchPlanner::new();
        let query = NearbyQuery::for_filter(Coordinate::new(1.0, 2.0), 10.0, MapFilter::All);

        assert_eq!(planner.plan(&query), Some(1));
        assert_eq!(planner.plan(&query), None);

        let wider = NearbyQuery::for_filter(Coordinate::new(1.0, 2.0), 50.0, MapFilter::All);
        assert_eq!(planner.plan(&wider), Some(2));

        let filtered = NearbyQuery::for_filter(Coordinate::new(1.0, 2.0), 50.0, MapFilter::Post);
        assert_eq!(planner.plan(&filtered), Some(3));
    }

    #[test]
    fn test_planner_discards_stale_responses() {
        let mut planner = FetchPlanner::new();
        let first = NearbyQuery::for_filter(Coordinate::new(1.0, 2.0), 10.0, MapFilter::All);
        let second = NearbyQuery::for_filter(Coordinate::new(1.0, 2.0), 99.0, MapFilter::All);

        let old_seq = planner.plan(&first).unwrap();
        let new_seq = planner.plan(&second).unwrap();

        // The older fetch resolves late: rejected.
        assert!(!planner.accept(old_seq));
        assert!(planner.accept(new_seq));
    }

    #[test]
    fn test_planner_force_always_issues() {
        let mut planner = FetchPlanner::new();
        let query = NearbyQuery::for_filter(Coordinate::new(1.0, 2.0), 10.0, MapFilter::All);

        assert_eq!(planner.plan(&query), Some(1));
        assert_eq!(planner.force(&query), 2);
        assert!(!planner.accept(1));
    }
}
