pub mod session_handler;

pub use session_handler::{
    __path_clear_last_error, __path_get_last_error, __path_get_me, __path_login, __path_logout,
    __path_register, clear_last_error, get_last_error, get_me, login, logout, register,
    SessionState,
};
