use gtk::prelude::*;
use gtk::{glib, Label, Orientation};
use libadwaita::prelude::*;
use libshumate::prelude::{LocationExt, MarkerExt};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, error};

use crate::aggregate::{aggregate, FetchPlanner, NearbyQuery};
use crate::config::Config;
use crate::data::{
    Coordinate, FilterState, MapFilter, SelectionState, SHARE_DURATIONS_HOURS,
};
use crate::geolocation::GeolocationSource;
use crate::markers::{add_marker_to_layer, create_self_marker};
use crate::service::LocationApi;
use crate::session::{SharePhase, ShareType, SharingSession, Visibility};

const INITIAL_ZOOM: f64 = 12.0;

/// Build the live map view: the map itself, the filter and sharing
/// controls, and the fetch pipeline feeding the marker layer.
pub fn create_map_view(
    api: Rc<LocationApi>,
    geo: Rc<GeolocationSource>,
    config: Rc<Config>,
    status_label: Label,
) -> libadwaita::ToastOverlay {
    let container = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .build();

    let toast_overlay = libadwaita::ToastOverlay::new();
    toast_overlay.set_child(Some(&container));

    // View-local state. Everything lives on the main loop; async work
    // re-enters through glib::spawn_future_local.
    let session = Rc::new(RefCell::new(SharingSession::new()));
    let filter = Rc::new(RefCell::new(FilterState::new(config.default_radius_km)));
    let selection = Rc::new(RefCell::new(SelectionState::default()));
    let planner = Rc::new(RefCell::new(FetchPlanner::new()));
    let device_position: Rc<RefCell<Option<Coordinate>>> = Rc::new(RefCell::new(None));

    // Map widget with themed raster tiles.
    let map = libshumate::SimpleMap::new();
    let style_manager = libadwaita::StyleManager::default();
    let tile_url = if style_manager.is_dark() {
        "https://a.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}.png"
    } else {
        "https://a.basemaps.cartocdn.com/light_all/{z}/{x}/{y}.png"
    };
    let map_source = libshumate::RasterRenderer::from_url(tile_url);
    map.set_map_source(Some(&map_source));
    map.set_vexpand(true);
    map.set_hexpand(true);

    // Two layers: one rebuilt per fetch for aggregated markers, one
    // for the self indicator and the static-share pin.
    let mut marker_layer_opt = None;
    let mut own_layer_opt = None;
    if let Some(map_view) = map.map() {
        if let Some(viewport) = map_view.viewport() {
            let marker_layer = libshumate::MarkerLayer::new(&viewport);
            map_view.add_layer(&marker_layer);
            let own_layer = libshumate::MarkerLayer::new(&viewport);
            map_view.add_layer(&own_layer);

            viewport.set_min_zoom_level(2);
            viewport.set_max_zoom_level(18);
            map_view.go_to_full(
                config.fallback_latitude,
                config.fallback_longitude,
                INITIAL_ZOOM,
            );

            marker_layer_opt = Some(marker_layer);
            own_layer_opt = Some(own_layer);
        }
    }

    let self_marker = create_self_marker();
    let pin_marker = create_pin_marker();

    // One shared refresh entry point: plans the query, issues at most
    // one fetch, and lets only the newest response repopulate the
    // layer.
    let do_refresh: Rc<dyn Fn(bool)> = {
        let api = api.clone();
        let config = config.clone();
        let filter = filter.clone();
        let planner = planner.clone();
        let device_position = device_position.clone();
        let marker_layer = marker_layer_opt.clone();
        let selection = selection.clone();
        let toast_overlay = toast_overlay.clone();

        Rc::new(move |force: bool| {
            let center = device_position
                .borrow()
                .unwrap_or_else(|| config.fallback_position());
            let state = filter.borrow();
            let query = NearbyQuery::for_filter(center, state.radius_km, state.active);
            drop(state);

            let seq = if force {
                planner.borrow_mut().force(&query)
            } else {
                match planner.borrow_mut().plan(&query) {
                    Some(seq) => seq,
                    None => return,
                }
            };

            let api = api.clone();
            let config = config.clone();
            let planner = planner.clone();
            let marker_layer = marker_layer.clone();
            let selection = selection.clone();
            let toast_overlay = toast_overlay.clone();
            glib::spawn_future_local(async move {
                let result = api.fetch_nearby(&query).await;

                // A newer fetch may have been issued while this one
                // was in flight; its result owns the map now.
                if !planner.borrow().accept(seq) {
                    debug!("discarding stale nearby response (seq {})", seq);
                    return;
                }

                match result {
                    Ok(records) => {
                        let markers = aggregate(&records, &config.viewer_id);
                        debug!("{} records -> {} markers", records.len(), markers.len());

                        if let Some(ref layer) = marker_layer {
                            layer.remove_all();
                            selection.borrow_mut().clear();
                            for marker in &markers {
                                add_marker_to_layer(layer, marker, &api, selection.clone());
                            }
                        }
                    }
                    Err(e) => {
                        error!("nearby fetch failed: {}", e);
                        toast_overlay.add_toast(libadwaita::Toast::new(&format!(
                            "Could not load nearby locations: {e}"
                        )));
                    }
                }
            });
        })
    };

    // Filter row: audience/kind filter plus search radius.
    let controls = gtk::Box::builder()
        .orientation(Orientation::Horizontal)
        .spacing(8)
        .margin_top(8)
        .margin_bottom(8)
        .margin_start(12)
        .margin_end(12)
        .build();

    let filter_labels: Vec<&str> = MapFilter::ALL.iter().map(|f| f.label()).collect();
    let filter_dropdown = gtk::DropDown::from_strings(&filter_labels);
    filter_dropdown.set_tooltip_text(Some("What to show on the map"));

    let filter_for_dropdown = filter.clone();
    let refresh_for_filter = do_refresh.clone();
    filter_dropdown.connect_selected_notify(move |dropdown| {
        let index = dropdown.selected() as usize;
        if let Some(choice) = MapFilter::ALL.get(index) {
            filter_for_dropdown.borrow_mut().active = *choice;
            refresh_for_filter(false);
        }
    });
    controls.append(&filter_dropdown);

    let radius_spin = gtk::SpinButton::with_range(1.0, 500.0, 1.0);
    radius_spin.set_value(config.default_radius_km);
    radius_spin.set_tooltip_text(Some("Search radius (km)"));

    let filter_for_radius = filter.clone();
    let refresh_for_radius = do_refresh.clone();
    radius_spin.connect_value_changed(move |spin| {
        filter_for_radius.borrow_mut().radius_km = spin.value();
        refresh_for_radius(false);
    });
    controls.append(&radius_spin);

    let refresh_button = gtk::Button::builder()
        .icon_name("view-refresh-symbolic")
        .tooltip_text("Refresh the map")
        .build();
    let refresh_for_button = do_refresh.clone();
    refresh_button.connect_clicked(move |_| {
        refresh_for_button(true);
    });
    controls.append(&refresh_button);

    let spacer = gtk::Box::builder()
        .hexpand(true)
        .build();
    controls.append(&spacer);

    // Sharing controls.
    let visibility_dropdown = gtk::DropDown::from_strings(&["Off", "Friends", "Public"]);
    visibility_dropdown.set_tooltip_text(Some("Who can see your location"));
    controls.append(&visibility_dropdown);

    let pin_toggle = gtk::ToggleButton::builder()
        .icon_name("mark-location-symbolic")
        .tooltip_text("Share a pinned point instead of your position")
        .build();
    controls.append(&pin_toggle);

    let duration_labels: Vec<String> = SHARE_DURATIONS_HOURS
        .iter()
        .map(|h| format!("{h}h"))
        .collect();
    let duration_refs: Vec<&str> = duration_labels.iter().map(|s| s.as_str()).collect();
    let duration_dropdown = gtk::DropDown::from_strings(&duration_refs);
    duration_dropdown.set_tooltip_text(Some("How long to share for"));
    controls.append(&duration_dropdown);

    let share_button = gtk::Button::builder()
        .label("Share")
        .build();
    share_button.add_css_class("suggested-action");
    controls.append(&share_button);

    let stop_button = gtk::Button::builder()
        .label("Stop")
        .build();
    controls.append(&stop_button);

    let shoutout_button = gtk::MenuButton::builder()
        .icon_name("user-bookmarks-symbolic")
        .tooltip_text("Drop a shoutout at your position")
        .build();
    controls.append(&shoutout_button);

    // Visibility changes re-enter configuration; dropping to Off while
    // a share is active also stops it server-side.
    let session_for_visibility = session.clone();
    let api_for_visibility = api.clone();
    let toast_for_visibility = toast_overlay.clone();
    let status_for_visibility = status_label.clone();
    let refresh_for_visibility = do_refresh.clone();
    visibility_dropdown.connect_selected_notify(move |dropdown| {
        let visibility = match dropdown.selected() {
            1 => Visibility::Friends,
            2 => Visibility::Public,
            _ => Visibility::Off,
        };

        let stop_needed = session_for_visibility.borrow_mut().set_visibility(visibility);
        update_status(&status_for_visibility, &session_for_visibility.borrow());

        if stop_needed {
            let api = api_for_visibility.clone();
            let session = session_for_visibility.clone();
            let toast_overlay = toast_for_visibility.clone();
            let status_label = status_for_visibility.clone();
            let refresh = refresh_for_visibility.clone();
            glib::spawn_future_local(async move {
                match api.stop_sharing().await {
                    Ok(()) => {
                        session.borrow_mut().confirm_stop();
                        update_status(&status_label, &session.borrow());
                        refresh(true);
                    }
                    Err(e) => {
                        error!("stop failed: {}", e);
                        toast_overlay
                            .add_toast(libadwaita::Toast::new(&format!("Could not stop sharing: {e}")));
                    }
                }
            });
        }
    });

    // Pin toggle: on switches to a static share awaiting a map click,
    // off resets to the device position. Local either way.
    let session_for_pin = session.clone();
    let pin_marker_for_toggle = pin_marker.clone();
    let own_layer_for_toggle = own_layer_opt.clone();
    let toast_for_pin = toast_overlay.clone();
    pin_toggle.connect_toggled(move |toggle| {
        if toggle.is_active() {
            session_for_pin.borrow_mut().set_type(ShareType::Static);
            if session_for_pin.borrow().phase() == SharePhase::Off {
                toggle.set_active(false);
                toast_for_pin.add_toast(libadwaita::Toast::new("Turn sharing on first"));
                return;
            }
            toast_for_pin.add_toast(libadwaita::Toast::new("Click the map to place your pin"));
        } else {
            session_for_pin.borrow_mut().reset_to_my_location();
            if let Some(ref layer) = own_layer_for_toggle {
                if pin_marker_for_toggle.parent().is_some() {
                    layer.remove_marker(&pin_marker_for_toggle);
                }
            }
        }
    });

    let session_for_duration = session.clone();
    duration_dropdown.connect_selected_notify(move |dropdown| {
        let index = dropdown.selected() as usize;
        if let Some(hours) = SHARE_DURATIONS_HOURS.get(index) {
            session_for_duration.borrow_mut().set_duration_hours(*hours);
        }
    });

    // Map clicks supply the static pin position.
    if let Some(map_view) = map.map() {
        let click = gtk::GestureClick::new();
        let session_for_click = session.clone();
        let pin_marker_for_click = pin_marker.clone();
        let own_layer_for_click = own_layer_opt.clone();
        let map_widget = map_view.clone();
        click.connect_released(move |_, _, x, y| {
            let session_ref = session_for_click.borrow();
            let wants_pin = session_ref.phase() != SharePhase::Off
                && session_ref.share_type() == ShareType::Static;
            drop(session_ref);
            if !wants_pin {
                return;
            }

            let Some(viewport) = map_widget.viewport() else {
                return;
            };
            let (latitude, longitude) = viewport.widget_coords_to_location(&map_widget, x, y);
            let position = Coordinate::new(latitude, longitude);

            if session_for_click.borrow_mut().select_static_position(position) {
                pin_marker_for_click.set_location(latitude, longitude);
                if let Some(ref layer) = own_layer_for_click {
                    if pin_marker_for_click.parent().is_none() {
                        layer.add_marker(&pin_marker_for_click);
                    }
                }
            }
        });
        map_view.add_controller(click);
    }

    // Commit: precondition check is local; only an ack flips the
    // session to Active.
    let session_for_share = session.clone();
    let api_for_share = api.clone();
    let device_for_share = device_position.clone();
    let toast_for_share = toast_overlay.clone();
    let status_for_share = status_label.clone();
    let refresh_for_share = do_refresh.clone();
    share_button.connect_clicked(move |_| {
        let request = match session_for_share
            .borrow()
            .prepare_commit(*device_for_share.borrow())
        {
            Ok(request) => request,
            Err(rejected) => {
                toast_for_share.add_toast(libadwaita::Toast::new(&rejected.to_string()));
                return;
            }
        };

        let api = api_for_share.clone();
        let session = session_for_share.clone();
        let toast_overlay = toast_for_share.clone();
        let status_label = status_for_share.clone();
        let refresh = refresh_for_share.clone();
        glib::spawn_future_local(async move {
            match api.share(&request).await {
                Ok(()) => {
                    session.borrow_mut().confirm_commit();
                    update_status(&status_label, &session.borrow());
                    toast_overlay.add_toast(libadwaita::Toast::new("Location shared"));
                    refresh(true);
                }
                Err(e) => {
                    error!("share failed: {}", e);
                    toast_overlay
                        .add_toast(libadwaita::Toast::new(&format!("Could not share location: {e}")));
                }
            }
        });
    });

    let session_for_stop = session.clone();
    let api_for_stop = api.clone();
    let toast_for_stop = toast_overlay.clone();
    let status_for_stop = status_label.clone();
    let refresh_for_stop = do_refresh.clone();
    stop_button.connect_clicked(move |_| {
        if !session_for_stop.borrow().begin_stop() {
            return;
        }

        let api = api_for_stop.clone();
        let session = session_for_stop.clone();
        let toast_overlay = toast_for_stop.clone();
        let status_label = status_for_stop.clone();
        let refresh = refresh_for_stop.clone();
        glib::spawn_future_local(async move {
            match api.stop_sharing().await {
                Ok(()) => {
                    session.borrow_mut().confirm_stop();
                    update_status(&status_label, &session.borrow());
                    toast_overlay.add_toast(libadwaita::Toast::new("Sharing stopped"));
                    refresh(true);
                }
                Err(e) => {
                    error!("stop failed: {}", e);
                    toast_overlay
                        .add_toast(libadwaita::Toast::new(&format!("Could not stop sharing: {e}")));
                }
            }
        });
    });

    shoutout_button.set_popover(Some(&create_shoutout_composer(
        api.clone(),
        geo.clone(),
        device_position.clone(),
        toast_overlay.clone(),
        do_refresh.clone(),
    )));

    container.append(&controls);
    container.append(&map);

    // Resolve the device position once at startup: it centers the
    // map, anchors the self indicator, and becomes the query center.
    {
        let geo = geo.clone();
        let device_position = device_position.clone();
        let toast_overlay = toast_overlay.clone();
        let refresh = do_refresh.clone();
        let self_marker = self_marker.clone();
        let own_layer = own_layer_opt.clone();
        let map = map.clone();
        glib::spawn_future_local(async move {
            let fix = geo.resolve().await;
            if fix.fallback {
                toast_overlay.add_toast(libadwaita::Toast::new(
                    "Couldn't determine your position, showing the default area",
                ));
            }

            *device_position.borrow_mut() = Some(fix.coordinate);
            self_marker.set_location(fix.coordinate.latitude, fix.coordinate.longitude);
            if let Some(ref layer) = own_layer {
                if self_marker.parent().is_none() {
                    layer.add_marker(&self_marker);
                }
            }
            if let Some(map_view) = map.map() {
                map_view.go_to_full(
                    fix.coordinate.latitude,
                    fix.coordinate.longitude,
                    INITIAL_ZOOM,
                );
            }

            refresh(false);
        });
    }

    update_status(&status_label, &session.borrow());

    toast_overlay
}

fn create_pin_marker() -> libshumate::Marker {
    let pin = Label::builder()
        .label("Pin")
        .build();
    pin.add_css_class("map-marker");
    pin.add_css_class("pin-marker");

    let map_marker = libshumate::Marker::new();
    map_marker.set_child(Some(&pin));
    map_marker
}

/// Small composer popover for ephemeral shoutouts.
fn create_shoutout_composer(
    api: Rc<LocationApi>,
    geo: Rc<GeolocationSource>,
    device_position: Rc<RefCell<Option<Coordinate>>>,
    toast_overlay: libadwaita::ToastOverlay,
    refresh: Rc<dyn Fn(bool)>,
) -> gtk::Popover {
    let popover = gtk::Popover::builder()
        .build();

    let composer_box = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .spacing(8)
        .margin_top(10)
        .margin_bottom(10)
        .margin_start(10)
        .margin_end(10)
        .width_request(260)
        .build();

    let title = Label::builder()
        .label("Shoutout")
        .xalign(0.0)
        .build();
    title.add_css_class("title-4");
    composer_box.append(&title);

    let entry = gtk::Entry::builder()
        .placeholder_text("What's happening here?")
        .max_length(120)
        .build();
    composer_box.append(&entry);

    let audience_dropdown = gtk::DropDown::from_strings(&["Friends", "Public"]);
    composer_box.append(&audience_dropdown);

    let send_button = gtk::Button::builder()
        .label("Send")
        .build();
    send_button.add_css_class("suggested-action");
    composer_box.append(&send_button);

    let entry_for_send = entry.clone();
    let popover_for_send = popover.clone();
    send_button.connect_clicked(move |_| {
        let content = entry_for_send.text().to_string();
        if content.trim().is_empty() {
            return;
        }
        let visibility = match audience_dropdown.selected() {
            1 => crate::data::Audience::Public,
            _ => crate::data::Audience::Friends,
        };

        popover_for_send.popdown();
        entry_for_send.set_text("");

        let api = api.clone();
        let geo = geo.clone();
        let device_position = device_position.clone();
        let toast_overlay = toast_overlay.clone();
        let refresh = refresh.clone();
        glib::spawn_future_local(async move {
            // Shoutouts pin to wherever the user actually is.
            let cached = *device_position.borrow();
            let position = match cached {
                Some(position) => position,
                None => {
                    let fix = geo.resolve().await;
                    *device_position.borrow_mut() = Some(fix.coordinate);
                    fix.coordinate
                }
            };

            match api.create_shoutout(position, content.trim(), visibility).await {
                Ok(()) => {
                    toast_overlay.add_toast(libadwaita::Toast::new("Shoutout posted"));
                    refresh(true);
                }
                Err(e) => {
                    error!("shoutout failed: {}", e);
                    toast_overlay
                        .add_toast(libadwaita::Toast::new(&format!("Could not post shoutout: {e}")));
                }
            }
        });
    });

    popover.set_child(Some(&composer_box));
    popover
}

fn update_status(status_label: &Label, session: &SharingSession) {
    let text = match session.phase() {
        SharePhase::Active => format!("Sharing · {}h", session.duration_hours()),
        SharePhase::Configuring | SharePhase::Off => "Not sharing".to_string(),
    };
    status_label.set_label(&text);
}
