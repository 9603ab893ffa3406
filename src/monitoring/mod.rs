pub mod ride_log;
