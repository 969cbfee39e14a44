//! Unix-like capability provider

mod unix_platform;

pub use unix_platform::UnixPlatform;

pub struct UnixPlatformFactory;

impl UnixPlatformFactory {
    pub fn create_platform() -> UnixPlatform {
        UnixPlatform::new()
    }

    pub fn platform_name() -> &'static str {
        "unix"
    }
}
