pub mod broadcaster;
pub mod classifier;
pub mod composer;
pub mod i18n;
pub mod messenger;
