// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Process-wide server registry (spec §3 "Server registry", §9 "Global
//! mutable state": "one lazily initialized singleton with its own lock").

use super::server::{Server, ServerCallback};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

fn registry() -> &'static Mutex<HashMap<String, Server>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Server>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Atomic check-or-insert (spec §4.4 "Server creation"): on a name already
/// present, the existing server is returned and `callback` is discarded.
pub(crate) fn get_or_create_server(name: &str, callback: Arc<dyn ServerCallback>) -> Server {
    let mut map = registry().lock().unwrap();
    map.entry(name.to_string())
        .or_insert_with(|| Server::new_inner(name.to_string(), callback))
        .clone()
}

pub(crate) fn lookup_server(name: &str) -> Option<Server> {
    registry().lock().unwrap().get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_create_with_same_name_returns_existing() {
        let a = Server::create("core_run_loop::tests::registry_dedup", |_id, p| Some(p.to_vec()));
        let b = Server::create("core_run_loop::tests::registry_dedup", |_id, _p| None);
        assert_eq!(a, b);
    }
}
