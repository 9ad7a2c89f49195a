mod helpers;

mod auth;
mod orders;
