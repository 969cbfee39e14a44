//! Windows capability provider

mod windows_platform;

pub use windows_platform::WindowsPlatform;

pub struct WindowsPlatformFactory;

impl WindowsPlatformFactory {
    pub fn create_platform() -> WindowsPlatform {
        WindowsPlatform::new()
    }

    pub fn platform_name() -> &'static str {
        "windows"
    }
}
