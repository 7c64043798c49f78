pub mod backup_config;
pub mod catalog;
pub mod copy_engine;
pub mod logging;
pub mod report;
pub mod restore;
pub mod result_error;
pub mod retention;
pub mod run;
pub mod scheduler;
pub mod selector;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
