//! Captive-portal access control: sessions, the requirements a client must
//! satisfy before its traffic is enabled, and the CAPPORT REST API over them.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod state;

pub mod crypto {
    pub mod token;
}

pub mod models {
    pub mod requirement;
    pub mod session;
}

pub mod repositories {
    pub mod requirement;
    pub mod session;
}

pub mod services {
    pub mod portal;
    pub mod session_state;
    pub mod traffic;
    pub mod usage;
}

pub mod handlers {
    pub mod capport;
    pub mod portal;
    pub mod request;
}

pub mod validation {
    pub mod session;
}
