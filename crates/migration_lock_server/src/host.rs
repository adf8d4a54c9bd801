//! The site's own pages: a post list, an admin area and post submission.

use std::collections::HashMap;
use std::convert::Infallible;

use migration_lock::{escape_html, maintenance, page_view, Coordinator, PageView, Role};
use migration_lock_sqlite::SqliteContentStore;
use warp::{
    filters::BoxedFilter,
    http::{StatusCode, Uri},
    reply::Response,
    Filter, Reply,
};

const FORM_LIMIT: u64 = 64 * 1024;

/// All host routes, behind the maintenance gate where visitors can reach
/// them.
pub fn host(coordinator: Coordinator, posts: SqliteContentStore) -> BoxedFilter<(Response,)> {
    let index = warp::get()
        .and(warp::path::end())
        .and(maintenance(coordinator.clone()))
        .and(with_posts(posts.clone()))
        .map(index);

    let admin = warp::get()
        .and(warp::path("wp-admin"))
        .and(warp::path::end())
        .and(page_view(coordinator.clone()))
        .map(admin);

    let new_post = warp::post()
        .and(warp::path("posts"))
        .and(warp::path::end())
        .and(maintenance(coordinator))
        .and(warp::body::content_length_limit(FORM_LIMIT))
        .and(warp::body::form())
        .and(with_posts(posts))
        .map(new_post);

    index.or(admin).unify().or(new_post).unify().boxed()
}

fn with_posts(
    posts: SqliteContentStore,
) -> impl Filter<Extract = (SqliteContentStore,), Error = Infallible> + Clone {
    warp::any().map(move || posts.clone())
}

fn index(view: PageView, posts: SqliteContentStore) -> Response {
    let rows = match posts.rows() {
        Ok(rows) => rows,
        Err(err) => {
            tracing::error!(?err, "could not list posts");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let mut page = String::from("<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body>");
    for row in rows {
        page.push_str("<article><h2>");
        page.push_str(&escape_html(&row.title));
        page.push_str("</h2>");
        page.push_str(&escape_html(&row.content));
        page.push_str("</article>");
    }
    page.push_str("</body></html>");
    view.render(page).into_response()
}

fn admin(view: PageView) -> Response {
    if view.role() != Role::Administrator {
        return StatusCode::FORBIDDEN.into_response();
    }
    let mut page = String::from(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body><h1>Dashboard</h1>",
    );
    for notice in view.admin_notices() {
        page.push_str(&notice);
    }
    page.push_str("</body></html>");
    view.render(page).into_response()
}

/// Writes go through the request gate. A neutralized write looks exactly
/// like a successful one to the submitter.
fn new_post(view: PageView, form: HashMap<String, String>, posts: SqliteContentStore) -> Response {
    let field = |name: &str| form.get(name).map(String::as_str).unwrap_or_default();
    match posts.insert_post(view.lock(), field("title"), field("guid"), field("content")) {
        Ok(written) => {
            tracing::debug!(written, "post submitted");
            warp::redirect::see_other(Uri::from_static("/")).into_response()
        }
        Err(err) => {
            tracing::error!(?err, "could not store post");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
