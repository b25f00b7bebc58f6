mod cas;
mod config;
mod get_claims;
mod login;
mod logout;
mod session;
mod verify;

pub use cas::*;
pub use config::*;
pub use get_claims::*;
pub use login::*;
pub use logout::*;
pub use session::*;
pub use verify::*;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation};
use log::{debug, error, info, warn};
use rocket::{
    fairing::AdHoc,
    get, launch, routes,
    http::{CookieJar, Header, Status},
    response::{Flash, Responder, Response},
    Build, Rocket, State,
};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use string_tools::*;
use thiserror::Error;
use url::Url;

/// Mounts the CAS routes. The validator is created from the configuration
/// unless the given instance already manages a `Box<dyn Validator>`.
pub fn app(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(config::fairing())
        .mount("/", routes![login::login, logout::logout, verify::verify, get_claims::get_claims])
}

#[launch]
fn rocket() -> _ {
    app(rocket::build())
}
