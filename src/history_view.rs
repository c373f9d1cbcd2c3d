use gtk::prelude::*;
use gtk::{glib, Orientation};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, error};

use crate::aggregate::{aggregate, FetchPlanner, NearbyQuery};
use crate::config::Config;
use crate::data::{Coordinate, Marker, SelectionState, TimePeriod};
use crate::markers::add_marker_to_layer;
use crate::service::LocationApi;

/// Geographic bounding box of a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl GeoBounds {
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_latitude + self.max_latitude) / 2.0,
            (self.min_longitude + self.max_longitude) / 2.0,
        )
    }

    /// Larger of the two spans; what the viewport has to accommodate.
    pub fn span_degrees(&self) -> f64 {
        let lat_span = self.max_latitude - self.min_latitude;
        let lon_span = self.max_longitude - self.min_longitude;
        lat_span.max(lon_span)
    }
}

/// Bounding box over every coordinate, or `None` when there are none.
pub fn bounding_box(coordinates: &[Coordinate]) -> Option<GeoBounds> {
    let first = coordinates.first()?;
    let mut bounds = GeoBounds {
        min_latitude: first.latitude,
        max_latitude: first.latitude,
        min_longitude: first.longitude,
        max_longitude: first.longitude,
    };

    for coordinate in &coordinates[1..] {
        bounds.min_latitude = bounds.min_latitude.min(coordinate.latitude);
        bounds.max_latitude = bounds.max_latitude.max(coordinate.latitude);
        bounds.min_longitude = bounds.min_longitude.min(coordinate.longitude);
        bounds.max_longitude = bounds.max_longitude.max(coordinate.longitude);
    }

    Some(bounds)
}

/// Zoom level that fits a span of the given size. A zero span (single
/// post) gets a close street-level view.
pub fn zoom_for_span(span_degrees: f64) -> f64 {
    const STEPS: [(f64, f64); 13] = [
        (180.0, 2.0),
        (90.0, 3.0),
        (45.0, 4.0),
        (20.0, 5.0),
        (10.0, 6.0),
        (5.0, 7.0),
        (2.0, 8.0),
        (1.0, 9.0),
        (0.5, 10.0),
        (0.2, 11.0),
        (0.1, 12.0),
        (0.05, 13.0),
        (0.02, 14.0),
    ];

    for (limit, zoom) in STEPS {
        if span_degrees >= limit {
            return zoom;
        }
    }
    15.0
}

/// Read-only map of one user's post history: posts only, no radius
/// limit, a selectable time window, and a one-time viewport fit per
/// fetch.
pub fn create_history_view(api: Rc<LocationApi>, config: Rc<Config>) -> libadwaita::ToastOverlay {
    let container = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .build();

    let toast_overlay = libadwaita::ToastOverlay::new();
    toast_overlay.set_child(Some(&container));

    let planner = Rc::new(RefCell::new(FetchPlanner::new()));
    let selection = Rc::new(RefCell::new(SelectionState::default()));

    let controls = gtk::Box::builder()
        .orientation(Orientation::Horizontal)
        .spacing(8)
        .margin_top(8)
        .margin_bottom(8)
        .margin_start(12)
        .margin_end(12)
        .build();

    let user_entry = gtk::Entry::builder()
        .placeholder_text("User id")
        .hexpand(true)
        .build();
    controls.append(&user_entry);

    let period_labels: Vec<&str> = TimePeriod::ALL.iter().map(|p| p.label()).collect();
    let period_dropdown = gtk::DropDown::from_strings(&period_labels);
    // Default to "All time".
    period_dropdown.set_selected((TimePeriod::ALL.len() - 1) as u32);
    controls.append(&period_dropdown);

    let load_button = gtk::Button::builder()
        .label("Load posts")
        .build();
    load_button.add_css_class("suggested-action");
    controls.append(&load_button);

    let map = libshumate::SimpleMap::new();
    let map_source = libshumate::RasterRenderer::from_url(
        "https://a.basemaps.cartocdn.com/light_all/{z}/{x}/{y}.png",
    );
    map.set_map_source(Some(&map_source));
    map.set_vexpand(true);
    map.set_hexpand(true);

    let mut marker_layer_opt = None;
    if let Some(map_view) = map.map() {
        if let Some(viewport) = map_view.viewport() {
            let marker_layer = libshumate::MarkerLayer::new(&viewport);
            map_view.add_layer(&marker_layer);
            viewport.set_min_zoom_level(2);
            viewport.set_max_zoom_level(18);
            map_view.go_to_full(config.fallback_latitude, config.fallback_longitude, 3.0);
            marker_layer_opt = Some(marker_layer);
        }
    }

    let run_fetch = {
        let api = api.clone();
        let config = config.clone();
        let planner = planner.clone();
        let selection = selection.clone();
        let marker_layer = marker_layer_opt.clone();
        let map = map.clone();
        let toast_overlay = toast_overlay.clone();
        let user_entry = user_entry.clone();
        let period_dropdown = period_dropdown.clone();

        Rc::new(move || {
            let target = user_entry.text().trim().to_string();
            if target.is_empty() {
                toast_overlay.add_toast(libadwaita::Toast::new("Enter a user id to look up"));
                return;
            }
            let period = TimePeriod::ALL
                .get(period_dropdown.selected() as usize)
                .copied()
                .unwrap_or_default();

            // The center is a formality here; the unbounded radius
            // makes the query cover everything.
            let query =
                NearbyQuery::for_user_posts(config.fallback_position(), &target, period);
            let Some(seq) = planner.borrow_mut().plan(&query) else {
                return;
            };

            let api = api.clone();
            let config = config.clone();
            let planner = planner.clone();
            let selection = selection.clone();
            let marker_layer = marker_layer.clone();
            let map = map.clone();
            let toast_overlay = toast_overlay.clone();
            glib::spawn_future_local(async move {
                let result = api.fetch_nearby(&query).await;

                if !planner.borrow().accept(seq) {
                    debug!("discarding stale history response (seq {})", seq);
                    return;
                }

                match result {
                    Ok(records) => {
                        let markers = aggregate(&records, &config.viewer_id);
                        debug!("history: {} posts for {}", markers.len(), query.target_user_id.as_deref().unwrap_or(""));

                        if let Some(ref layer) = marker_layer {
                            layer.remove_all();
                            selection.borrow_mut().clear();
                            for marker in &markers {
                                add_marker_to_layer(layer, marker, &api, selection.clone());
                            }
                        }

                        fit_viewport(&map, &markers);

                        if markers.is_empty() {
                            toast_overlay
                                .add_toast(libadwaita::Toast::new("No posts in this time window"));
                        }
                    }
                    Err(e) => {
                        error!("history fetch failed: {}", e);
                        toast_overlay.add_toast(libadwaita::Toast::new(&format!(
                            "Could not load post history: {e}"
                        )));
                    }
                }
            });
        })
    };

    let run_for_button: Rc<dyn Fn()> = run_fetch.clone();
    load_button.connect_clicked(move |_| {
        run_for_button();
    });

    let run_for_entry: Rc<dyn Fn()> = run_fetch.clone();
    user_entry.connect_activate(move |_| {
        run_for_entry();
    });

    // Changing the window re-triggers the fetch for the same user.
    let run_for_period: Rc<dyn Fn()> = run_fetch.clone();
    let user_entry_for_period = user_entry.clone();
    period_dropdown.connect_selected_notify(move |_| {
        if !user_entry_for_period.text().trim().is_empty() {
            run_for_period();
        }
    });

    container.append(&controls);
    container.append(&map);

    toast_overlay
}

/// One-time camera action per fetch: fit the viewport to the bounding
/// box of everything that came back. An empty result leaves the
/// camera alone.
fn fit_viewport(map: &libshumate::SimpleMap, markers: &[Marker]) {
    let coordinates: Vec<Coordinate> = markers.iter().map(|m| m.position).collect();
    let Some(bounds) = bounding_box(&coordinates) else {
        return;
    };

    let center = bounds.center();
    let zoom = zoom_for_span(bounds.span_degrees());
    if let Some(map_view) = map.map() {
        map_view.go_to_full(center.latitude, center.longitude, zoom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_of_nothing() {
        assert_eq!(bounding_box(&[]), None);
    }

    #[test]
    fn test_bounding_box_single_point() {
        let bounds = bounding_box(&[Coordinate::new(48.8, 2.3)]).unwrap();

        assert_eq!(bounds.center(), Coordinate::new(48.8, 2.3));
        assert_eq!(bounds.span_degrees(), 0.0);
        assert_eq!(zoom_for_span(bounds.span_degrees()), 15.0);
    }

    #[test]
    fn test_bounding_box_covers_all_posts() {
        // Five posts scattered over a city.
        let coordinates = [
            Coordinate::new(40.70, -74.01),
            Coordinate::new(40.75, -73.98),
            Coordinate::new(40.72, -74.05),
            Coordinate::new(40.80, -73.95),
            Coordinate::new(40.68, -74.00),
        ];

        let bounds = bounding_box(&coordinates).unwrap();

        assert_eq!(bounds.min_latitude, 40.68);
        assert_eq!(bounds.max_latitude, 40.80);
        assert_eq!(bounds.min_longitude, -74.05);
        assert_eq!(bounds.max_longitude, -73.95);
        for coordinate in &coordinates {
            assert!(coordinate.latitude >= bounds.min_latitude);
            assert!(coordinate.latitude <= bounds.max_latitude);
            assert!(coordinate.longitude >= bounds.min_longitude);
            assert!(coordinate.longitude <= bounds.max_longitude);
        }
    }

    #[test]
    fn test_zoom_shrinks_as_span_grows() {
        assert_eq!(zoom_for_span(200.0), 2.0);
        assert_eq!(zoom_for_span(50.0), 4.0);
        assert_eq!(zoom_for_span(0.3), 11.0);
        assert!(zoom_for_span(0.001) > zoom_for_span(10.0));
    }
}
