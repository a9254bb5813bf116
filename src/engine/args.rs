//! Translation of a configuration snapshot into FastTree command-line flags.

use crate::param::{ParamMap, Value};
use crate::params::NUCLEOTIDE;

/// Flags for `config`, in snapshot order. Keys the executable has no flag for
/// are skipped.
pub fn translate_config(config: &ParamMap) -> Vec<String> {
    let mut out = Vec::new();
    for (key, value) in config {
        if !push_flags(&mut out, key, value) {
            tracing::debug!(%key, %value, "no command-line flag for parameter");
        }
    }
    out
}

fn push_flags(out: &mut Vec<String>, key: &str, value: &Value) -> bool {
    let flag = |out: &mut Vec<String>, on: bool, name: &str| {
        if on {
            out.push(name.to_string());
        }
    };
    match (key, value) {
        ("ncodes", Value::Int(n)) => flag(out, *n == NUCLEOTIDE, "-nt"),
        ("pseudo", Value::Bool(b)) => flag(out, *b, "-pseudo"),
        ("quote", Value::Bool(b)) => flag(out, *b, "-quote"),
        // JTT and JC are the defaults for their alphabets.
        ("ml_model", Value::Str(m)) => match m.as_str() {
            "wag" | "lg" | "gtr" => out.push(format!("-{m}")),
            _ => {}
        },
        ("ncat", Value::Int(1)) => out.push("-nocat".into()),
        ("ncat", Value::Int(n)) => out.extend(["-cat".to_string(), n.to_string()]),
        ("second", Value::Bool(true)) => out.push("-2nd".into()),
        ("second", Value::Bool(false)) => out.push("-no2nd".into()),
        ("fastest", Value::Bool(b)) => flag(out, *b, "-fastest"),
        ("spr", Value::Int(n)) => out.extend(["-spr".to_string(), n.to_string()]),
        ("mlnni", Value::Int(-1)) => {}
        ("mlnni", Value::Int(n)) => out.extend(["-mlnni".to_string(), n.to_string()]),
        ("exhaustive", Value::Bool(b)) => {
            if *b {
                out.extend(["-slownni", "-mlacc", "2"].map(String::from));
            }
        }
        _ => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::fasttree_params;
    use crate::param::ParamPath;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_translate_to_nucleotide_run() {
        let tree = fasttree_params().unwrap();
        assert_eq!(
            translate_config(&tree.serialize()),
            vec!["-nt", "-cat", "20", "-2nd", "-fastest", "-spr", "2"]
        );
    }

    #[test]
    fn protein_run_with_tweaks() {
        let mut tree = fasttree_params().unwrap();
        tree.set_value(&ParamPath::from(["sequence", "ncodes"]), 20).unwrap();
        tree.set_value(&ParamPath::from(["model", "ml_model"]), "lg").unwrap();
        tree.set_value(&ParamPath::from(["model", "ncat"]), 1).unwrap();
        tree.set_value(&ParamPath::from(["model", "second"]), false).unwrap();
        tree.set_value(&ParamPath::from(["model", "fastest"]), false).unwrap();
        tree.set_value(&ParamPath::from(["topology", "mlnni"]), 0).unwrap();
        tree.set_value(&ParamPath::from(["topology", "exhaustive"]), true).unwrap();
        assert_eq!(
            translate_config(&tree.serialize()),
            vec![
                "-lg", "-nocat", "-no2nd", "-spr", "2", "-mlnni", "0", "-slownni", "-mlacc", "2"
            ]
        );
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let mut config = ParamMap::new();
        config.insert("bootstrap".into(), Value::Int(100));
        config.insert("pseudo".into(), Value::Bool(true));
        assert_eq!(translate_config(&config), vec!["-pseudo"]);
    }
}
