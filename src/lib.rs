pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod router;
pub mod state;
pub mod token_cache;

pub mod crypto {
    pub mod password;
    pub mod token;
}

pub mod models {
    pub mod message;
    pub mod referral;
    pub mod session;
    pub mod task;
    pub mod user;
}

pub mod repositories;

pub mod services {
    pub mod auth;
    pub mod matchmaking;
    pub mod membership;
    pub mod messages;
    pub mod referral;
    pub mod registry;
    pub mod tasks;
    pub mod users;
}

pub mod handlers {
    pub mod auth;
    pub mod collabs;
    pub mod messages;
    pub mod response;
    pub mod socket;
    pub mod tasks;
    pub mod users;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod input;
}
