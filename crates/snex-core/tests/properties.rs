//! Property-based tests for snex-core.
//!
//! Tests type equality laws, layout finalisation, overload resolution
//! determinism, parameter range conversions and per-voice state using
//! proptest for randomized input generation.

use std::sync::Arc;

use proptest::prelude::*;
use snex_core::{
    ComplexType, FunctionClass, FunctionData, FunctionPointer, NativeType, ParameterRange,
    PolyData, PolyHandler, PrepareSpecs, SpanType, StructType, Symbol, TypeError, TypeInfo, Value,
    VoiceSetter,
};

const SCALARS: [NativeType; 3] = [NativeType::Integer, NativeType::Float, NativeType::Double];

fn scalar() -> impl Strategy<Value = NativeType> {
    (0usize..SCALARS.len()).prop_map(|i| SCALARS[i])
}

fn struct_of(id: &str, members: &[NativeType]) -> StructType {
    let t = StructType::new(id);
    for (i, m) in members.iter().enumerate() {
        t.add_member(format!("m{i}"), TypeInfo::native(*m), None).unwrap();
    }
    t
}

fn identity(args: &[Value]) -> Value {
    args.first().copied().unwrap_or_default()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// TypeInfo equality is reflexive and symmetric, and ignores the const
    /// and reference flags.
    #[test]
    fn type_equality_laws(a in scalar(), b in scalar(), is_const: bool, is_ref: bool) {
        let ta = TypeInfo::native(a);
        let tb = TypeInfo::native(b).with_const(is_const).with_ref(is_ref);

        prop_assert_eq!(&ta, &ta.clone());
        prop_assert_eq!(ta == tb, tb == ta);
        prop_assert_eq!(ta == tb, a == b);
    }

    /// Two independently built structs with the same members compare equal.
    #[test]
    fn struct_identity_is_structural(members in prop::collection::vec(scalar(), 1..8)) {
        let a = struct_of("S", &members);
        let b = struct_of("S", &members);
        a.finalise_alignment().unwrap();
        b.finalise_alignment().unwrap();

        prop_assert_eq!(
            TypeInfo::complex(Arc::new(a)),
            TypeInfo::complex(Arc::new(b))
        );
    }

    /// Finalising twice fails and leaves the layout unchanged; members can't
    /// be added afterwards.
    #[test]
    fn finalisation_happens_once(members in prop::collection::vec(scalar(), 1..8)) {
        let t = struct_of("S", &members);
        t.finalise_alignment().unwrap();
        let size = t.required_byte_size();

        prop_assert!(matches!(t.finalise_alignment(), Err(TypeError::AlreadyFinalised(_))));
        prop_assert!(t.add_member("late", NativeType::Float.into(), None).is_err());
        prop_assert_eq!(t.required_byte_size(), size);
    }

    /// Every member offset is aligned and the total size is a multiple of
    /// the largest alignment.
    #[test]
    fn struct_layout_is_aligned(members in prop::collection::vec(scalar(), 1..12)) {
        let t = struct_of("S", &members);
        t.finalise_alignment().unwrap();

        let max_align = members.iter().map(|m| m.alignment()).max().unwrap_or(1);
        for (i, m) in members.iter().enumerate() {
            let offset = t.member_offset(i).unwrap();
            prop_assert_eq!(offset % m.alignment(), 0);
        }
        prop_assert_eq!(t.required_byte_size() % max_align, 0);
    }

    /// Span size is element size times count.
    #[test]
    fn span_size(element in scalar(), count in 1usize..64) {
        let span = SpanType::new(element.into(), count);
        span.finalise_alignment().unwrap();
        prop_assert_eq!(span.required_byte_size(), element.size() * count);
    }

    /// The overloads found for a symbol don't depend on registration order.
    #[test]
    fn overload_collection_is_order_independent(
        types in prop::collection::vec(scalar(), 1..6),
        seed in any::<u64>(),
    ) {
        let make = |order: &[NativeType]| {
            let mut c = FunctionClass::new("C");
            for t in order {
                c.add_function(
                    FunctionData::new("f", *t)
                        .with_arg("x", *t)
                        .with_function(FunctionPointer::Free(identity)),
                );
            }
            c
        };

        let mut shuffled = types.clone();
        let len = shuffled.len();
        for i in 0..len {
            let j = ((seed >> (i % 64)) as usize) % len;
            shuffled.swap(i, j);
        }

        let symbol = Symbol::parse("C::f");
        let mut a = Vec::new();
        let mut b = Vec::new();
        make(&types).add_matching_functions(&mut a, &symbol);
        make(&shuffled).add_matching_functions(&mut b, &symbol);

        let sa: Vec<String> = a.iter().map(FunctionData::signature).collect();
        let sb: Vec<String> = b.iter().map(FunctionData::signature).collect();
        prop_assert_eq!(sa, sb);
    }

    /// Denormalising a normalised value returns it (continuous ranges).
    #[test]
    fn range_round_trip(
        min in -1000.0f64..0.0,
        span in 0.1f64..1000.0,
        skew in 0.1f64..5.0,
        t in 0.0f64..=1.0,
    ) {
        let range = ParameterRange::new(min, min + span).with_skew(skew);
        let value = range.denormalize(t);
        prop_assert!(value >= range.min - 1e-9 && value <= range.max + 1e-9);
        prop_assert!((range.normalize(value) - t).abs() < 1e-6);
    }

    /// Writes outside a voice context reach every voice; writes inside one
    /// reach only that voice.
    #[test]
    fn poly_data_voice_isolation(num_voices in 2usize..16, voice in 0usize..16, value in -1.0f32..1.0) {
        let voice = voice % num_voices;
        let handler = Arc::new(PolyHandler::new(num_voices));
        let mut data = PolyData::new(0.0f32);
        data.prepare(&PrepareSpecs::new(44100.0, 64, 1).with_poly_handler(Arc::clone(&handler)));

        for v in data.voices_mut() {
            *v = 1.0;
        }
        {
            let _setter = VoiceSetter::new(&handler, voice);
            *data.get_mut() = value;
        }

        for (i, v) in data.all().iter().enumerate() {
            let expected = if i == voice { value } else { 1.0 };
            prop_assert_eq!(*v, expected);
        }
        prop_assert_eq!(handler.voice_index(), -1);
    }
}
