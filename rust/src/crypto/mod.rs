//! Cryptography used by the credential store. Only authenticated encryption
//! of credential values lives here; key sourcing belongs to `credentials`.

pub mod secrets;
