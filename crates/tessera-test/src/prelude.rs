//! Common imports for tests.

pub use crate::{
    ProviderCall, ScriptedProvider, init_test_tracing, temp_workspace, test_config,
    test_identity, test_uri,
};
