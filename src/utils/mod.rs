pub mod compress;
pub mod listeners;
pub mod net;
pub mod string;
