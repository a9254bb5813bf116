//! FastTree parameter schema.

use crate::param::{Field, Group, ParamTree, SchemaError, Value, ValueType};

pub const NUCLEOTIDE: i64 = 4;
pub const PROTEIN: i64 = 20;

/// Build the default FastTree parameter tree.
pub fn fasttree_params() -> Result<ParamTree, SchemaError> {
    let sequence = Group::new("sequence")
        .label("Sequence")
        .with(
            Field::builder("ncodes", ValueType::Int)
                .label("Type")
                .choices([(NUCLEOTIDE, "Nucleotide"), (PROTEIN, "Protein")])
                .default(NUCLEOTIDE)
                .build()?,
        )
        .with(
            Field::builder("pseudo", ValueType::Bool)
                .label("Use distance pseudocounts")
                .doc(
                    "Use pseudocounts to estimate distances between\n\
                     sequences with little or no overlap. Recommended\n\
                     for highly gapped sequences (weight=1).",
                )
                .default(false)
                .build()?,
        )
        .with(
            Field::builder("quote", ValueType::Bool)
                .label("Quote full names")
                .doc(
                    "Quote sequence names in the output and allow\n\
                     spaces, commas, parentheses and colons in them,\n\
                     but not single quote characters (fasta files only).",
                )
                .default(false)
                .build()?,
        );

    let model = Group::new("model")
        .label("Model Options")
        .with(
            Field::builder("ml_model", ValueType::Str)
                .label("ML model")
                .doc(
                    "Maximum likelihood model:\n \
                     - JTT: Jones-Taylor-Thorton 1992 (a.a. only)\n \
                     - WAG: Whelan-And-Goldman 2001 (a.a. only)\n \
                     - LG: Le-Gascuel 2008 (a.a. only)\n \
                     - JC: Jukes-Cantor (nt only)\n \
                     - GTR: Generalized time-reversible (nt only)",
                )
                .choices([
                    ("jtt", "JTT"),
                    ("wag", "WAG"),
                    ("lg", "LG"),
                    ("jc", "JC"),
                    ("gtr", "GTR"),
                ])
                .default("jtt")
                .build()?,
        )
        .with(
            Field::builder("ncat", ValueType::Int)
                .label("CAT number")
                .doc(
                    "The number of rate categories of sites.\n\
                     Enter 1 for no CAT model (default 20).",
                )
                .range(Some(1.0), None)
                .default(20)
                .build()?,
        )
        .with(
            Field::builder("second", ValueType::Bool)
                .label("2nd-level top hits heuristic")
                .doc(
                    "Reduces memory usage and running time but\n\
                     may lead to marginal reductions in tree quality.",
                )
                .default(true)
                .build()?,
        )
        .with(
            Field::builder("fastest", ValueType::Bool)
                .label("Faster neighbor-joining")
                .doc(
                    "Speed up the neighbor-joining phase by\n\
                     turning off local hill-climbing search.\n\
                     Also use top-hits heuristic more aggressively.\n\
                     Recommended for over 50,000 sequences.",
                )
                .default(true)
                .build()?,
        );

    let topology = Group::new("topology")
        .label("Topology Refinement")
        .with(
            Field::builder("spr", ValueType::Int)
                .label("SPR rounds")
                .doc("Number of Subtree-Prune-Regraft rounds\n(default 2).")
                .default(2)
                .build()?,
        )
        .with(
            Field::builder("mlnni", ValueType::Int)
                .label("ML-NNI limit")
                .doc(
                    "Limit the number of rounds of maximum-likelihood\n\
                     nearest-neighbor interchanges. If set to -1,\n\
                     do 2*log(N) rounds, where N is the number of\n\
                     unique sequences (default). If set to 0, turn off\n\
                     both min-evo NNIs and SPRs",
                )
                .default(-1)
                .build()?,
        )
        .with(
            Field::builder("exhaustive", ValueType::Bool)
                .label("Exhaustive NNIs")
                .doc(
                    "Turn off heuristics to avoid constant subtrees\n\
                     (affects both ML and ME NNIs). Additionally,\n\
                     always optimize all 5 branches at each NNI\n\
                     in 2 rounds.",
                )
                .default(false)
                .build()?,
        );

    ParamTree::new(
        Group::new("root")
            .with(sequence)
            .with(model)
            .with(topology),
    )
}

/// Models that make sense for the given alphabet size.
///
/// The `ml_model` field accepts all of them; renderers use this to narrow the
/// offered list once the sequence type is known.
pub fn models_for(ncodes: &Value) -> &'static [&'static str] {
    match ncodes.as_int() {
        Some(NUCLEOTIDE) => &["jc", "gtr"],
        Some(PROTEIN) => &["jtt", "wag", "lg"],
        _ => &["jtt", "wag", "lg", "jc", "gtr"],
    }
}
