//! What visitors and administrators see while the lock is active, or about
//! to be.

use std::convert::Infallible;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use warp::{
    http::{header, HeaderMap, StatusCode},
    reply::Response,
    Filter, Rejection, Reply,
};

use crate::config::{MigrationOptions, SharedSecret, SiteSettings};
use crate::lock::{Coordinator, RequestLock};
use crate::with_coordinator;

const MAINTENANCE_MESSAGE: &str = "<h1 style=\"color:red\">Website Under Maintenance</h1>\
<p>We are currently performing maintenance. We will be back online shortly!</p>";

const ADMIN_BANNER: &str = "<div style=\"width: 100%;background-color: #cc2d2d;position: fixed;\
top: 0;text-align: center;color: #270808; z-index:99999\" id=\"v1_migration_adminbar_notice\">\
<h1>Maintenance Mode</h1><p>You are seeing this page as an Administrator. Non Administrators \
will be shown a maintenance notice while we perform server updates on your site.</p></div>";

const ACTIVE_NOTICE: &str = "<div class=\"notice notice-warning\">\
<h1>Website Under Maintenance</h1>\
<p>We are currently performing maintenance. We will be back online shortly!</p></div>";

/// Who is looking at the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Administrator,
    Visitor,
}

impl Role {
    /// Administrators present the admin token as a bearer token.
    pub fn from_headers(headers: &HeaderMap, admin_token: Option<&SharedSecret>) -> Self {
        let Some(token) = admin_token else {
            return Role::Visitor;
        };
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.as_bytes().strip_prefix(b"Bearer "));
        match presented {
            Some(presented) if token.matches(presented) => Role::Administrator,
            _ => Role::Visitor,
        }
    }
}

/// One inbound page view, with the lock evaluated once for all of it.
#[derive(Clone, Debug)]
pub struct PageView {
    lock: RequestLock,
    role: Role,
    site: SiteSettings,
}

impl PageView {
    pub fn new(lock: RequestLock, role: Role, site: SiteSettings) -> Self {
        Self { lock, role, site }
    }

    pub fn lock(&self) -> &RequestLock {
        &self.lock
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn maintenance_mode(&self) -> bool {
        self.lock.is_lock_active() && self.lock.options().maintenance_mode
    }

    /// Visitors get the maintenance page instead of the site.
    pub fn shows_interstitial(&self) -> bool {
        self.maintenance_mode() && self.role != Role::Administrator
    }

    /// Administrators keep the site, with a banner on top.
    pub fn admin_banner(&self) -> Option<&'static str> {
        (self.maintenance_mode() && self.role == Role::Administrator).then_some(ADMIN_BANNER)
    }

    /// Finish a rendered page, adding the banner in the footer if due.
    pub fn render(&self, mut page: String) -> warp::reply::Html<String> {
        if let Some(banner) = self.admin_banner() {
            match page.rfind("</body>") {
                Some(idx) => page.insert_str(idx, banner),
                None => page.push_str(banner),
            }
        }
        warp::reply::html(page)
    }

    /// Notices for the administrative area. Never shown on the public site.
    pub fn admin_notices(&self) -> Vec<String> {
        if self.lock.is_lock_active() {
            return vec![ACTIVE_NOTICE.to_string()];
        }
        let options = self.lock.options();
        if options.show_maintenance_notice {
            return vec![upcoming_notice(options, &self.site)];
        }
        Vec::new()
    }
}

/// The scheduled-maintenance notice, in the site's timezone.
pub fn upcoming_notice(options: &MigrationOptions, site: &SiteSettings) -> String {
    let start = options.migration_window_start;
    let end = options.migration_window_end;

    let mut out =
        String::from("<div class=\"notice notice-warning\"><h2>Scheduled Maintenance</h2><p>");
    out.push_str("We will be performing scheduled maintenance on <strong>");
    out.push_str(&local(start, site, &site.date_format));
    out.push_str("</strong> in the timezone of your site.");
    if options.show_migration_window {
        out.push_str("<br />The update will begin ");
        if start >= end {
            out.push_str("sometime after ");
            out.push_str(&local(start, site, &site.time_format));
        } else {
            out.push_str("sometime between ");
            out.push_str(&local(start, site, &site.time_format));
            out.push_str(" and ");
            out.push_str(&local(end, site, &site.time_format));
        }
        out.push('.');
    }
    out.push_str("</p><p>During this time you will not be able to make any changes to your site. ");
    if options.maintenance_mode {
        out.push_str(
            "Visitors who are not Administrators will see a maintenance notice \
             when visiting your site. ",
        );
    }
    out.push_str("The process should take ");
    out.push_str(&escape_html(&options.migration_time_est));
    out.push_str(".</p></div>");
    out
}

/// Format `at` in the site's timezone. A broken pattern falls back to RFC 3339.
fn local(at: DateTime<Utc>, site: &SiteSettings, pattern: &str) -> String {
    let at = at.with_timezone(&site.offset());
    let mut out = String::new();
    if write!(out, "{}", at.format(pattern)).is_err() {
        tracing::warn!(pattern, "invalid site date pattern");
        return at.to_rfc3339();
    }
    out
}

/// Escape text for inclusion in HTML.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Rejection used to cut a page view short with the maintenance page.
#[derive(Debug)]
pub struct Maintenance;

impl warp::reject::Reject for Maintenance {}

/// The full maintenance page, served with status 200.
pub fn maintenance_page() -> Response {
    let page = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
<title>Website Under Maintenance</title></head><body>{}</body></html>",
        MAINTENANCE_MESSAGE
    );
    warp::reply::with_status(warp::reply::html(page), StatusCode::OK).into_response()
}

/// Evaluates the lock and the caller's role for a page view.
pub fn page_view(
    coordinator: Coordinator,
) -> impl Filter<Extract = (PageView,), Error = Infallible> + Clone {
    warp::header::headers_cloned()
        .and(with_coordinator(coordinator))
        .map(|headers: HeaderMap, c: Coordinator| {
            let lock = c.request(c.signals(&headers));
            let role = Role::from_headers(&headers, c.config().admin_token.as_ref());
            PageView::new(lock, role, c.site().clone())
        })
}

/// Like [`page_view`], but visitors are turned away with the maintenance
/// page before any page logic runs. Pair with [`handle_rejection`].
pub fn maintenance(
    coordinator: Coordinator,
) -> impl Filter<Extract = (PageView,), Error = Rejection> + Clone {
    page_view(coordinator).and_then(|view: PageView| async move {
        if view.shows_interstitial() {
            tracing::debug!("serving maintenance page");
            return Err(warp::reject::custom(Maintenance));
        }
        Ok(view)
    })
}

/// Turns a [`Maintenance`] rejection into the maintenance page.
pub async fn handle_rejection(err: Rejection) -> Result<Response, Rejection> {
    if err.find::<Maintenance>().is_some() {
        return Ok(maintenance_page());
    }
    Err(err)
}
