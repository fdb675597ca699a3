use axum::{
    Form, Json, Router,
    extract::Query,
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::services::ServeDir;

use crate::auth::{self, AppState};
use crate::users::IMG_ROUTE;
use crate::{admin, channels, messages, reactions, search, standup, users};

#[derive(Debug, Deserialize)]
struct Echo {
    echo: Option<String>,
}

async fn echo_get(Query(req): Query<Echo>) -> Json<Value> {
    Json(json!({ "echo": req.echo }))
}

async fn echo_post(Form(req): Form<Echo>) -> Json<Value> {
    Json(json!({ "echo": req.echo }))
}

/// Every slackr route, plus the profile photo directory under `/imgs`.
pub fn router(state: AppState) -> Router {
    let img_dir = state.config.img_dir.clone();

    Router::new()
        .route("/echo/get", get(echo_get))
        .route("/echo/post", post(echo_post))
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/passwordreset/request", post(auth::passwordreset_request))
        .route("/auth/passwordreset/reset", post(auth::passwordreset_reset))
        // Channels
        .route("/channels/create", post(channels::create))
        .route("/channels/list", get(channels::list))
        .route("/channels/listall", get(channels::listall))
        .route("/channel/invite", post(channels::invite))
        .route("/channel/details", get(channels::details))
        .route("/channel/messages", get(channels::messages))
        .route("/channel/leave", post(channels::leave))
        .route("/channel/join", post(channels::join))
        .route("/channel/addowner", post(channels::addowner))
        .route("/channel/removeowner", post(channels::removeowner))
        // Messages
        .route("/message/send", post(messages::send))
        .route("/message/sendlater", post(messages::sendlater))
        .route("/message/remove", delete(messages::remove))
        .route("/message/edit", put(messages::edit))
        .route("/message/react", post(reactions::react))
        .route("/message/unreact", post(reactions::unreact))
        .route("/message/pin", post(reactions::pin))
        .route("/message/unpin", post(reactions::unpin))
        // Users
        .route("/user/profile", get(users::profile))
        .route("/user/profile/setname", put(users::setname))
        .route("/user/profile/setemail", put(users::setemail))
        .route("/user/profile/sethandle", put(users::sethandle))
        .route("/user/profiles/uploadphoto", post(users::uploadphoto))
        .route("/users/all", get(users::all))
        // Standup
        .route("/standup/start", post(standup::start))
        .route("/standup/active", get(standup::active))
        .route("/standup/send", post(standup::send))
        // Search / admin
        .route("/search", get(search::search))
        .route("/admin/userpermission/change", post(admin::userpermission_change))
        .with_state(state)
        .nest_service(IMG_ROUTE, ServeDir::new(img_dir))
}
