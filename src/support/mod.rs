pub mod uri;

pub use uri::RouteUri;
