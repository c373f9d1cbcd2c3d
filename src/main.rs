use gtk::prelude::*;
use gtk::{glib, Align, Application, Label};
use libadwaita::{
    prelude::*, ApplicationWindow, ColorScheme, HeaderBar, StyleManager, ToolbarView, ViewStack,
    ViewSwitcher,
};
use std::rc::Rc;
use tracing::{info, warn};

mod aggregate;
mod config;
mod data;
mod geolocation;
mod history_view;
mod map_view;
mod markers;
mod service;
mod session;

use config::{Config, ThemePreference};
use geolocation::GeolocationSource;
use service::LocationApi;

const APP_ID: &str = "com.waypost.Waypost";

fn main() -> glib::ExitCode {
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    // Tokio runtime for reqwest; the GTK main loop drives the futures.
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let _guard = rt.enter();

    let app = Application::builder()
        .application_id(APP_ID)
        .build();

    app.connect_activate(build_ui);

    let exit_code = app.run();

    drop(_guard);
    drop(rt);

    exit_code
}

fn apply_theme(style_manager: &StyleManager, theme: ThemePreference) {
    let scheme = match theme {
        ThemePreference::System => ColorScheme::Default,
        ThemePreference::Light => ColorScheme::ForceLight,
        ThemePreference::Dark => ColorScheme::ForceDark,
    };
    style_manager.set_color_scheme(scheme);
}

fn build_ui(app: &Application) {
    let config = Rc::new(Config::load());
    info!("using location service at {}", config.service_url);

    // Theme preference is read once here and only changed through the
    // header-bar toggle, which persists it back to disk.
    let style_manager = StyleManager::default();
    apply_theme(&style_manager, config.theme);

    let api = Rc::new(LocationApi::new(&config.service_url));
    let geo = Rc::new(GeolocationSource::new(
        &config.geolocation_url,
        config.fallback_position(),
    ));

    // Sharing status shown in the middle of the header bar.
    let status_label = Label::builder()
        .label("Not sharing")
        .build();
    status_label.add_css_class("status-display");

    let stack = ViewStack::builder()
        .build();

    let map_page = map_view::create_map_view(
        api.clone(),
        geo.clone(),
        config.clone(),
        status_label.clone(),
    );
    stack.add_titled(&map_page, Some("map"), "Map");

    let history_page = history_view::create_history_view(api.clone(), config.clone());
    stack.add_titled(&history_page, Some("history"), "History");

    // Floating switcher over the content, like a mobile tab bar.
    let view_switcher = ViewSwitcher::builder()
        .stack(&stack)
        .policy(libadwaita::ViewSwitcherPolicy::Wide)
        .halign(Align::Center)
        .valign(Align::End)
        .margin_bottom(24)
        .build();
    view_switcher.add_css_class("floating-switcher");

    let overlay = gtk::Overlay::new();
    overlay.set_child(Some(&stack));
    overlay.add_overlay(&view_switcher);

    let header_bar = HeaderBar::builder()
        .build();
    header_bar.set_title_widget(Some(&status_label));

    let theme_button = gtk::Button::builder()
        .icon_name("weather-clear-night-symbolic")
        .tooltip_text("Toggle dark mode")
        .build();

    let config_for_theme = config.clone();
    let style_manager_for_theme = style_manager.clone();
    theme_button.connect_clicked(move |_| {
        let next = if style_manager_for_theme.is_dark() {
            ThemePreference::Light
        } else {
            ThemePreference::Dark
        };
        apply_theme(&style_manager_for_theme, next);

        let mut updated = (*config_for_theme).clone();
        updated.theme = next;
        if let Err(e) = updated.save() {
            warn!("could not persist theme preference: {}", e);
        }
    });
    header_bar.pack_end(&theme_button);

    let toolbar_view = ToolbarView::builder()
        .build();
    toolbar_view.add_top_bar(&header_bar);
    toolbar_view.set_content(Some(&overlay));

    let window = ApplicationWindow::builder()
        .application(app)
        .title("Waypost")
        .default_width(1000)
        .default_height(700)
        .build();

    let css_provider = gtk::CssProvider::new();
    css_provider.load_from_data(
        ".floating-switcher {
            background-color: alpha(@window_bg_color, 0.85);
            border-radius: 12px;
            padding: 8px;
            box-shadow: 0 4px 12px alpha(black, 0.3);
        }
        .map-marker {
            background-color: alpha(@accent_bg_color, 0.75);
            border-radius: 16px;
            padding: 4px 10px;
            font-size: 11px;
            font-weight: bold;
            min-height: 0;
            min-width: 0;
            box-shadow: 0 2px 6px alpha(black, 0.4);
        }
        .map-marker:hover {
            background-color: alpha(@accent_bg_color, 0.95);
            box-shadow: 0 3px 8px alpha(black, 0.5);
        }
        .marker-live {
            background-color: alpha(@accent_bg_color, 0.85);
        }
        .marker-static {
            background-color: alpha(@success_bg_color, 0.85);
        }
        .marker-post {
            background-color: alpha(@warning_bg_color, 0.85);
        }
        .marker-shoutout {
            background-color: alpha(@error_bg_color, 0.75);
        }
        .self-marker {
            background-color: @accent_bg_color;
            color: @accent_fg_color;
            border: 2px solid @window_bg_color;
        }
        .pin-marker {
            background-color: alpha(@window_fg_color, 0.8);
            color: @window_bg_color;
        }
        .map-popover > contents {
            background-color: alpha(@card_bg_color, 0.95);
            border-radius: 12px;
            box-shadow: 0 4px 16px alpha(black, 0.6);
        }
        .status-display {
            font-size: 13px;
            font-weight: 600;
            padding: 4px 12px;
            background-color: alpha(@accent_bg_color, 0.15);
            border-radius: 6px;
        }
        .badge {
            background-color: alpha(@accent_bg_color, 0.15);
            border-radius: 6px;
            padding: 3px 8px;
            font-size: 10px;
            font-weight: 600;
            min-height: 0;
            text-transform: uppercase;
            letter-spacing: 0.5px;
        }
        .badge-time {
            background-color: alpha(@window_fg_color, 0.08);
            color: alpha(@window_fg_color, 0.7);
        }
        .media-thumbnail {
            background-color: alpha(@window_bg_color, 0.3);
            border-radius: 8px;
        }
        .play-affordance {
            color: white;
            background-color: alpha(black, 0.55);
            border-radius: 16px;
            padding: 6px;
        }
        .shoutout-text {
            font-size: 14px;
            font-style: italic;
        }",
    );

    gtk::style_context_add_provider_for_display(
        &gtk::prelude::WidgetExt::display(&window),
        &css_provider,
        gtk::STYLE_PROVIDER_PRIORITY_APPLICATION,
    );

    window.set_content(Some(&toolbar_view));
    window.present();
}
