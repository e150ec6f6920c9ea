pub mod registro;

pub use registro::{
    RegistroClient, RegistroError, RegistroReceipt, CONNECTIVITY_MESSAGE, FALLBACK_DETAIL,
    REGISTRAR_PATH,
};
