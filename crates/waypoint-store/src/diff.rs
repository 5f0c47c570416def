use serde_json::Value;
use waypoint_types::CanonicalState;
use waypoint_wire::{Patch, PatchMeta};
use waypoint_types::SourceType;

/// A structural difference between two checkpoints, expressed the same
/// way an agent expresses a write: op + JSON Pointer + value. Used for
/// scenario compare (spec.md §4.4 `Diff`), never fed back through the
/// merge engine — there is no provenance to attach, so `meta` is a fixed
/// zero-confidence assumption stamped `_diff`.
pub fn diff_states(a: &CanonicalState, b: &CanonicalState) -> Vec<Patch> {
    let va = waypoint_state::to_value(a);
    let vb = waypoint_state::to_value(b);
    let mut out = Vec::new();
    walk("".to_string(), &va, &vb, &mut out);
    out
}

fn walk(path: String, a: &Value, b: &Value, out: &mut Vec<Patch>) {
    if a == b {
        return;
    }
    match (a, b) {
        (Value::Object(ma), Value::Object(mb)) => {
            for (key, bv) in mb {
                let child_path = format!("{path}/{}", escape(key));
                match ma.get(key) {
                    Some(av) => walk(child_path, av, bv, out),
                    None => out.push(add(child_path, bv.clone())),
                }
            }
            for key in ma.keys() {
                if !mb.contains_key(key) {
                    out.push(remove(format!("{path}/{}", escape(key))));
                }
            }
        }
        (Value::Array(aa), Value::Array(ba)) => {
            let max = aa.len().max(ba.len());
            for i in 0..max {
                let child_path = format!("{path}/{i}");
                match (aa.get(i), ba.get(i)) {
                    (Some(av), Some(bv)) => walk(child_path, av, bv, out),
                    (None, Some(bv)) => out.push(add(child_path, bv.clone())),
                    (Some(_), None) => out.push(remove(child_path)),
                    (None, None) => {}
                }
            }
        }
        _ => out.push(replace(path, b.clone())),
    }
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn diff_meta() -> PatchMeta {
    PatchMeta {
        source_type: SourceType::Assumption,
        confidence: 0.0,
        sources: Vec::new(),
    }
}

fn add(path: String, value: Value) -> Patch {
    Patch {
        op: waypoint_wire::PatchOp::Add,
        path,
        value,
        meta: diff_meta(),
    }
}

fn replace(path: String, value: Value) -> Patch {
    Patch {
        op: waypoint_wire::PatchOp::Replace,
        path,
        value,
        meta: diff_meta(),
    }
}

fn remove(path: String) -> Patch {
    Patch {
        op: waypoint_wire::PatchOp::Remove,
        path,
        value: Value::Null,
        meta: diff_meta(),
    }
}
