//! Property tests for the converter and comparator graphs

use proptest::prelude::*;
use skript_lang::{
    ComparatorOptions, ComparatorRegistry, ConverterFlags, ConverterRegistry, Relation, Value,
};
use std::any::TypeId;
use std::sync::Arc;

/// Distinct value classes for chain tests
#[derive(Debug, Clone, Copy, PartialEq)]
struct Hop<const N: usize>(i64);

const HOPS: usize = 6;

fn hop_value(n: usize, v: i64) -> Value {
    match n {
        0 => Value::new(Hop::<0>(v)),
        1 => Value::new(Hop::<1>(v)),
        2 => Value::new(Hop::<2>(v)),
        3 => Value::new(Hop::<3>(v)),
        4 => Value::new(Hop::<4>(v)),
        _ => Value::new(Hop::<5>(v)),
    }
}

fn hop_type(n: usize) -> TypeId {
    hop_value(n, 0).value_type()
}

fn hop_inner(value: &Value) -> Option<i64> {
    value
        .downcast_ref::<Hop<0>>()
        .map(|h| h.0)
        .or_else(|| value.downcast_ref::<Hop<1>>().map(|h| h.0))
        .or_else(|| value.downcast_ref::<Hop<2>>().map(|h| h.0))
        .or_else(|| value.downcast_ref::<Hop<3>>().map(|h| h.0))
        .or_else(|| value.downcast_ref::<Hop<4>>().map(|h| h.0))
        .or_else(|| value.downcast_ref::<Hop<5>>().map(|h| h.0))
}

/// Hop<i> -> Hop<i+1>, adding one per hop
fn linear_chain(max_chain: usize) -> ConverterRegistry {
    let converters = ConverterRegistry::new(max_chain);
    converters.register::<Hop<0>, Hop<1>, _>(|h| Some(Hop(h.0 + 1)), ConverterFlags::NONE).unwrap();
    converters.register::<Hop<1>, Hop<2>, _>(|h| Some(Hop(h.0 + 1)), ConverterFlags::NONE).unwrap();
    converters.register::<Hop<2>, Hop<3>, _>(|h| Some(Hop(h.0 + 1)), ConverterFlags::NONE).unwrap();
    converters.register::<Hop<3>, Hop<4>, _>(|h| Some(Hop(h.0 + 1)), ConverterFlags::NONE).unwrap();
    converters.register::<Hop<4>, Hop<5>, _>(|h| Some(Hop(h.0 + 1)), ConverterFlags::NONE).unwrap();
    converters
}

/// Hop<n> -> Hop<n+1> with the given flags, adding one
fn register_hop(converters: &ConverterRegistry, n: usize, flags: ConverterFlags) {
    match n {
        0 => converters.register::<Hop<0>, Hop<1>, _>(|h| Some(Hop(h.0 + 1)), flags),
        1 => converters.register::<Hop<1>, Hop<2>, _>(|h| Some(Hop(h.0 + 1)), flags),
        2 => converters.register::<Hop<2>, Hop<3>, _>(|h| Some(Hop(h.0 + 1)), flags),
        3 => converters.register::<Hop<3>, Hop<4>, _>(|h| Some(Hop(h.0 + 1)), flags),
        _ => converters.register::<Hop<4>, Hop<5>, _>(|h| Some(Hop(h.0 + 1)), flags),
    }
    .unwrap();
}

fn edge_flags() -> impl Strategy<Value = ConverterFlags> {
    prop_oneof![
        3 => Just(ConverterFlags::NONE),
        1 => Just(ConverterFlags::NO_LEFT_CHAINING),
        1 => Just(ConverterFlags::NO_RIGHT_CHAINING),
        1 => Just(ConverterFlags::NO_CHAINING),
        2 => Just(ConverterFlags::ALLOW_UNSAFE_CASTS),
        1 => Just(ConverterFlags::ALLOW_UNSAFE_CASTS | ConverterFlags::NO_LEFT_CHAINING),
    ]
}

/// Whether consecutive edges with these flags may form one chain
fn composes(flags: &[ConverterFlags]) -> bool {
    let joints = flags.windows(2).all(|pair| {
        !pair[0].contains(ConverterFlags::NO_RIGHT_CHAINING) && !pair[1].contains(ConverterFlags::NO_LEFT_CHAINING)
    });
    let unsafe_hops: Vec<usize> = (0..flags.len()).filter(|&i| flags[i].is_unsafe()).collect();
    joints && unsafe_hops.len() <= 1 && unsafe_hops.iter().all(|&i| i == 0 || i == flags.len() - 1)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Left(i64);
#[derive(Debug, Clone, Copy, PartialEq)]
struct Right(i64);

fn numbers() -> ComparatorRegistry {
    let converters = Arc::new(ConverterRegistry::default());
    converters.register::<i64, f64, _>(|i| Some(*i as f64), ConverterFlags::NONE).unwrap();
    let comparators = ComparatorRegistry::new(converters);
    comparators
        .register::<f64, f64, _>(
            |a, b| a.partial_cmp(b).map(Relation::from_ordering).unwrap_or(Relation::Incomparable),
            ComparatorOptions::ordered(),
        )
        .unwrap();
    comparators
}

proptest! {
    #[test]
    fn test_chains_respect_length_limit(
        max_chain in 1usize..4,
        from in 0usize..HOPS,
        to in 0usize..HOPS,
        v in -1000i64..1000,
    ) {
        let converters = linear_chain(max_chain);
        let converted = converters.convert(&hop_value(from, v), hop_type(to));
        let hops = to as i64 - from as i64;

        if from == to {
            prop_assert_eq!(converted.and_then(|c| hop_inner(&c)), Some(v));
        } else if hops > 0 && hops as usize <= max_chain {
            prop_assert_eq!(converted.and_then(|c| hop_inner(&c)), Some(v + hops));
            prop_assert!(converters.has_path(hop_type(from), hop_type(to)));
        } else {
            prop_assert!(converted.is_none());
            prop_assert!(!converters.has_path(hop_type(from), hop_type(to)));
        }
    }

    #[test]
    fn test_comparisons_are_symmetric(a in -1.0e6f64..1.0e6, b in -1000i64..1000) {
        let comparators = numbers();
        let forward = comparators.compare(&Value::new(a), &Value::new(b));
        let backward = comparators.compare(&Value::new(b), &Value::new(a));
        prop_assert_eq!(forward, backward.switched());
        prop_assert_ne!(forward, Relation::Incomparable);
    }

    #[test]
    fn test_flagged_chains_compose_only_where_allowed(
        flags in prop::collection::vec(edge_flags(), HOPS - 1),
        v in -1000i64..1000,
    ) {
        let converters = ConverterRegistry::new(HOPS);
        for (n, f) in flags.iter().enumerate() {
            register_hop(&converters, n, *f);
        }

        for from in 0..HOPS {
            for to in from + 1..HOPS {
                let converted = converters.convert(&hop_value(from, v), hop_type(to));
                if composes(&flags[from..to]) {
                    prop_assert_eq!(converted.and_then(|c| hop_inner(&c)), Some(v + (to - from) as i64));
                } else {
                    prop_assert!(converted.is_none(), "{:?} composed {}..{}", flags, from, to);
                    prop_assert!(!converters.has_path(hop_type(from), hop_type(to)));
                }
            }
        }
    }

    #[test]
    fn test_registered_comparators_answer_swapped_queries(
        scale in 1i64..4,
        offset in -20i64..20,
        a in -100i64..100,
        b in -100i64..100,
        inversion in any::<bool>(),
    ) {
        let comparators = ComparatorRegistry::new(Arc::new(ConverterRegistry::default()));
        let options = if inversion {
            ComparatorOptions::ordered()
        } else {
            ComparatorOptions::ordered().without_inversion()
        };
        comparators
            .register::<Left, Right, _>(
                move |l, r| Relation::from_ordering(l.0.cmp(&(r.0 * scale + offset))),
                options,
            )
            .unwrap();

        let (left, right) = (Value::new(Left(a)), Value::new(Right(b)));
        let forward = comparators.compare(&left, &right);
        prop_assert_eq!(forward, Relation::from_ordering(a.cmp(&(b * scale + offset))));

        let backward = comparators.compare(&right, &left);
        if inversion {
            prop_assert_eq!(backward, forward.switched());
        } else {
            prop_assert_eq!(backward, Relation::Incomparable);
        }
    }

    #[test]
    fn test_relation_laws(a in -50i64..50, b in -50i64..50) {
        let result = Relation::from_ordering(a.cmp(&b));
        prop_assert_eq!(result.switched().switched(), result);
        for relation in [
            Relation::Equal,
            Relation::NotEqual,
            Relation::Greater,
            Relation::GreaterOrEqual,
            Relation::Smaller,
            Relation::SmallerOrEqual,
        ] {
            prop_assert_ne!(relation.is_implied_by(result), relation.negated().is_implied_by(result));
        }
    }
}

#[test]
fn test_unsafe_casts_never_compose() {
    let converters = ConverterRegistry::new(3);
    converters
        .register::<Hop<0>, Hop<1>, _>(|h| Some(Hop(h.0)), ConverterFlags::ALLOW_UNSAFE_CASTS)
        .unwrap();
    converters
        .register::<Hop<1>, Hop<2>, _>(|h| Some(Hop(h.0)), ConverterFlags::ALLOW_UNSAFE_CASTS)
        .unwrap();
    converters
        .register::<Hop<2>, Hop<3>, _>(|h| Some(Hop(h.0)), ConverterFlags::NONE)
        .unwrap();

    assert!(converters.has_path(hop_type(0), hop_type(1)));
    assert!(!converters.has_path(hop_type(0), hop_type(2)));
    // one unsafe edge followed by a safe one is fine
    assert!(converters.has_path(hop_type(1), hop_type(3)));
}

#[test]
fn test_no_chaining_flags() {
    let converters = ConverterRegistry::new(3);
    converters
        .register::<Hop<0>, Hop<1>, _>(|h| Some(Hop(h.0)), ConverterFlags::NO_RIGHT_CHAINING)
        .unwrap();
    converters
        .register::<Hop<1>, Hop<2>, _>(|h| Some(Hop(h.0)), ConverterFlags::NONE)
        .unwrap();
    converters
        .register::<Hop<2>, Hop<3>, _>(|h| Some(Hop(h.0)), ConverterFlags::NO_LEFT_CHAINING)
        .unwrap();

    assert!(!converters.has_path(hop_type(0), hop_type(2)));
    assert!(!converters.has_path(hop_type(1), hop_type(3)));
    assert!(converters.has_path(hop_type(2), hop_type(3)));
}
