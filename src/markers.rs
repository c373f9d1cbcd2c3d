use gtk::prelude::*;
use gtk::{glib, Label, Orientation};
use libshumate::prelude::{LocationExt, MarkerExt};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

use crate::data::{
    format_relative_time, LocationKind, Marker, MarkerPayload, MediaKind, SelectionState,
};
use crate::service::LocationApi;

/// CSS class per marker kind. Pure presentation, one table.
pub fn kind_css_class(kind: LocationKind) -> &'static str {
    match kind {
        LocationKind::Live => "marker-live",
        LocationKind::Static => "marker-static",
        LocationKind::Post => "marker-post",
        LocationKind::Shoutout => "marker-shoutout",
    }
}

/// Place one aggregated marker on the layer: a styled button that pops
/// up the detail panel and tracks the selection while it is open.
pub fn add_marker_to_layer(
    marker_layer: &libshumate::MarkerLayer,
    marker: &Marker,
    api: &LocationApi,
    selection: Rc<RefCell<SelectionState>>,
) {
    let label = if marker.is_me {
        "You".to_string()
    } else {
        format!("@{}", marker.user.username)
    };

    let marker_button = gtk::Button::builder()
        .label(&label)
        .build();
    marker_button.add_css_class("map-marker");
    marker_button.add_css_class(kind_css_class(marker.kind()));

    let popover = create_detail_popover(marker, api);
    popover.set_parent(&marker_button);

    // Selecting a marker opens the panel; dismissing the panel clears
    // the selection again.
    let marker_id = marker.id.clone();
    let selection_for_open = selection.clone();
    let popover_clone = popover.clone();
    marker_button.connect_clicked(move |_| {
        selection_for_open.borrow_mut().select(&marker_id);
        popover_clone.popup();
    });

    popover.connect_closed(move |_| {
        selection.borrow_mut().clear();
    });

    let map_marker = libshumate::Marker::new();
    map_marker.set_child(Some(&marker_button));
    map_marker.set_location(marker.position.latitude, marker.position.longitude);
    marker_layer.add_marker(&map_marker);
}

/// The viewer's own position indicator. Not part of the aggregation
/// output and not interactive.
pub fn create_self_marker() -> libshumate::Marker {
    let dot = Label::builder()
        .label("You")
        .build();
    dot.add_css_class("map-marker");
    dot.add_css_class("self-marker");

    let map_marker = libshumate::Marker::new();
    map_marker.set_child(Some(&dot));
    map_marker
}

/// Build the detail panel for one marker: avatar, names, kind label,
/// relative timestamp, address, and the kind-specific payload.
fn create_detail_popover(marker: &Marker, api: &LocationApi) -> gtk::Popover {
    let popover = gtk::Popover::builder()
        .build();
    popover.add_css_class("map-popover");

    let popover_box = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .spacing(8)
        .margin_top(10)
        .margin_bottom(10)
        .margin_start(10)
        .margin_end(10)
        .width_request(280)
        .build();

    // Header: avatar next to full name and handle.
    let header_box = gtk::Box::builder()
        .orientation(Orientation::Horizontal)
        .spacing(10)
        .build();

    let display_name = if marker.user.full_name.is_empty() {
        marker.user.username.clone()
    } else {
        marker.user.full_name.clone()
    };

    let avatar = libadwaita::Avatar::new(40, Some(&display_name), true);
    if let Some(ref url) = marker.user.avatar_url {
        load_avatar(url, &avatar);
    }
    header_box.append(&avatar);

    let names_box = gtk::Box::builder()
        .orientation(Orientation::Vertical)
        .spacing(2)
        .build();

    let name_label = Label::builder()
        .label(&display_name)
        .xalign(0.0)
        .ellipsize(gtk::pango::EllipsizeMode::End)
        .build();
    name_label.add_css_class("title-4");
    names_box.append(&name_label);

    let handle_label = Label::builder()
        .label(&format!("@{}", marker.user.username))
        .xalign(0.0)
        .ellipsize(gtk::pango::EllipsizeMode::End)
        .build();
    handle_label.add_css_class("caption");
    handle_label.add_css_class("dim-label");
    names_box.append(&handle_label);

    header_box.append(&names_box);
    popover_box.append(&header_box);

    // Kind badge and humanized last-update time.
    let meta_box = gtk::Box::builder()
        .orientation(Orientation::Horizontal)
        .spacing(6)
        .build();

    let kind_badge = Label::builder()
        .label(marker.kind().label())
        .build();
    kind_badge.add_css_class("badge");
    kind_badge.add_css_class(kind_css_class(marker.kind()));
    meta_box.append(&kind_badge);

    if !marker.updated_at.is_empty() {
        let time_label = Label::builder()
            .label(&format_relative_time(&marker.updated_at))
            .build();
        time_label.add_css_class("badge");
        time_label.add_css_class("badge-time");
        meta_box.append(&time_label);
    }

    popover_box.append(&meta_box);

    if let Some(ref address) = marker.address {
        let address_label = Label::builder()
            .label(address)
            .xalign(0.0)
            .wrap(true)
            .wrap_mode(gtk::pango::WrapMode::WordChar)
            .build();
        address_label.add_css_class("caption");
        address_label.add_css_class("dim-label");
        popover_box.append(&address_label);
    }

    match &marker.payload {
        MarkerPayload::Live | MarkerPayload::Static => {}
        MarkerPayload::Post(post) => {
            if let Some(ref media_url) = post.media_url {
                popover_box.append(&create_media_preview(media_url, post.media_kind));
            }

            if !post.content.is_empty() {
                let content_label = Label::builder()
                    .label(&post.content)
                    .xalign(0.0)
                    .wrap(true)
                    .wrap_mode(gtk::pango::WrapMode::WordChar)
                    .lines(4)
                    .ellipsize(gtk::pango::EllipsizeMode::End)
                    .build();
                popover_box.append(&content_label);
            }

            let stats_label = Label::builder()
                .label(&format!(
                    "{} likes · {} comments",
                    post.like_count, post.comment_count
                ))
                .xalign(0.0)
                .build();
            stats_label.add_css_class("caption");
            stats_label.add_css_class("dim-label");
            popover_box.append(&stats_label);
        }
        MarkerPayload::Shoutout(text) => {
            let shoutout_label = Label::builder()
                .label(text)
                .xalign(0.0)
                .wrap(true)
                .wrap_mode(gtk::pango::WrapMode::WordChar)
                .build();
            shoutout_label.add_css_class("shoutout-text");
            popover_box.append(&shoutout_label);
        }
    }

    // Derived navigation. Each action exists only when its backing
    // data does: a post id for "view post", somebody else's profile
    // for "view profile".
    let actions_box = gtk::Box::builder()
        .orientation(Orientation::Horizontal)
        .spacing(6)
        .build();

    if let Some(post_id) = marker.post_id() {
        let view_post_button = gtk::Button::builder()
            .label("View post")
            .build();
        view_post_button.add_css_class("suggested-action");

        let url = api.post_url(post_id);
        let popover_for_post = popover.clone();
        view_post_button.connect_clicked(move |_| {
            popover_for_post.popdown();
            if let Err(e) = open::that(&url) {
                debug!("failed to open post: {}", e);
            }
        });
        actions_box.append(&view_post_button);
    }

    if !marker.is_me {
        let view_profile_button = gtk::Button::builder()
            .label("View profile")
            .build();

        let url = api.profile_url(&marker.user.username);
        let popover_for_profile = popover.clone();
        view_profile_button.connect_clicked(move |_| {
            popover_for_profile.popdown();
            if let Err(e) = open::that(&url) {
                debug!("failed to open profile: {}", e);
            }
        });
        actions_box.append(&view_profile_button);
    }

    if actions_box.first_child().is_some() {
        popover_box.append(&actions_box);
    }

    popover.set_child(Some(&popover_box));
    popover
}

/// Post media thumbnail; videos get a centered play affordance.
fn create_media_preview(media_url: &str, media_kind: MediaKind) -> gtk::Overlay {
    let picture = gtk::Picture::builder()
        .height_request(140)
        .hexpand(true)
        .can_shrink(true)
        .content_fit(gtk::ContentFit::Cover)
        .visible(false)
        .build();
    picture.add_css_class("media-thumbnail");
    load_picture(media_url, &picture);

    let overlay = gtk::Overlay::new();
    overlay.set_child(Some(&picture));

    if media_kind == MediaKind::Video {
        let play_icon = gtk::Image::builder()
            .icon_name("media-playback-start-symbolic")
            .pixel_size(32)
            .halign(gtk::Align::Center)
            .valign(gtk::Align::Center)
            .build();
        play_icon.add_css_class("play-affordance");
        overlay.add_overlay(&play_icon);
    }

    overlay
}

fn load_picture(url: &str, picture: &gtk::Picture) {
    let url = url.to_string();
    let picture = picture.clone();
    glib::spawn_future_local(async move {
        if let Some(texture) = fetch_texture(&url).await {
            picture.set_paintable(Some(&texture));
            picture.set_visible(true);
        }
    });
}

fn load_avatar(url: &str, avatar: &libadwaita::Avatar) {
    let url = url.to_string();
    let avatar = avatar.clone();
    glib::spawn_future_local(async move {
        if let Some(texture) = fetch_texture(&url).await {
            avatar.set_custom_image(Some(&texture));
        }
    });
}

async fn fetch_texture(url: &str) -> Option<gdk::Texture> {
    match reqwest::get(url).await {
        Ok(response) => match response.bytes().await {
            Ok(bytes) => {
                let bytes = glib::Bytes::from(&bytes.to_vec());
                match gdk::Texture::from_bytes(&bytes) {
                    Ok(texture) => Some(texture),
                    Err(e) => {
                        debug!("could not decode image {}: {}", url, e);
                        None
                    }
                }
            }
            Err(e) => {
                debug!("could not read image {}: {}", url, e);
                None
            }
        },
        Err(e) => {
            debug!("could not load image {}: {}", url, e);
            None
        }
    }
}
