pub mod bucket;
pub mod influx_http;
pub mod util;
pub mod write_bridge;
