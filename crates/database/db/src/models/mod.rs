/// This module contains the key value model.
pub mod kv;
