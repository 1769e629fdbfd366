//! Signature codec.
//!
//! Signatures are the recursive binary grammars of ECMA-335 §II.23.2 stored in the `#Blob`
//! heap: field, method, property, local variable, `TypeSpec` and `MethodSpec` signatures.
//! [`SignatureParser`] decodes them by recursive descent with a nesting limit of
//! [`MAX_RECURSION_DEPTH`], the `encode_*` functions produce the exact inverse.
//!
//! Type references inside signatures use the compressed `TypeDefOrRefOrSpec` form and are
//! exposed as [`crate::TableIndex`].
//!
//! # Examples
//!
//! ```rust
//! use dotmeta::metadata::signatures::{
//!     encode_method_signature, parse_method_signature, SimpleType, TypeSignature,
//! };
//!
//! // instance void (int32)
//! let blob = [0x20, 0x01, 0x01, 0x08];
//! let signature = parse_method_signature(&blob)?;
//! assert!(signature.has_this);
//! assert_eq!(signature.params[0].base, TypeSignature::Simple(SimpleType::I4));
//! assert_eq!(encode_method_signature(&signature)?, blob);
//! # Ok::<(), dotmeta::Error>(())
//! ```

mod encoders;
mod parser;
mod types;

pub use encoders::*;
pub use parser::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::tables::{TableId, TableIndex},
        Error,
    };

    #[test]
    fn method_with_generic_instance() {
        // static !!0 Foo<T>(class List`1<!!0>, int32[]) with one generic parameter
        #[rustfmt::skip]
        let blob = [
            0x10, 0x01,             // GENERIC, 1 generic parameter
            0x02,                   // 2 parameters
            0x1E, 0x00,             // return MVAR 0
            0x15, 0x12, 0x09, 0x01, // GENERICINST CLASS TypeRef[1] 1 argument
            0x1E, 0x00,             //   MVAR 0
            0x1D, 0x08,             // SZARRAY int32
        ];

        let signature = parse_method_signature(&blob).unwrap();
        assert!(!signature.has_this);
        assert_eq!(signature.generic_parameter_count, 1);
        assert_eq!(signature.params.len(), 2);
        match &signature.params[0].base {
            TypeSignature::ClassOrValue(class) => {
                assert!(class.is_class);
                assert_eq!(class.type_ref, TableIndex::new(TableId::TypeRef, 1));
                assert_eq!(class.generic_arguments.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(encode_method_signature(&signature).unwrap(), blob);
    }

    #[test]
    fn vararg_reference() {
        // vararg void (int32, ..., float64)
        let blob = [0x05, 0x02, 0x01, 0x08, 0x41, 0x0D];
        let signature = parse_method_signature(&blob).unwrap();
        assert_eq!(signature.calling_convention, SignatureCallingConvention::VarArg);
        assert_eq!(signature.params.len(), 1);
        assert_eq!(signature.varargs.len(), 1);
        assert_eq!(encode_method_signature(&signature).unwrap(), blob);
    }

    #[test]
    fn complex_array() {
        // int32[0...,0...] as a TypeSpec
        let blob = [0x14, 0x08, 0x02, 0x00, 0x02, 0x00, 0x00];
        let signature = parse_type_spec_signature(&blob).unwrap();
        match &signature {
            TypeSignature::ComplexArray(array) => {
                assert_eq!(array.rank, 2);
                assert!(array.sizes.is_empty());
                assert_eq!(array.lower_bounds, vec![0, 0]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(encode_type_spec_signature(&signature).unwrap(), blob);

        // negative lower bound -1 encodes as 0x7F
        let blob = [0x14, 0x08, 0x01, 0x01, 0x05, 0x01, 0x7F];
        let signature = parse_type_spec_signature(&blob).unwrap();
        match &signature {
            TypeSignature::ComplexArray(array) => {
                assert_eq!(array.sizes, vec![5]);
                assert_eq!(array.lower_bounds, vec![-1]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(encode_type_spec_signature(&signature).unwrap(), blob);
    }

    #[test]
    fn field_with_modifier() {
        // modreq(IsVolatile) int32 with IsVolatile = TypeRef[3]
        let blob = [0x06, 0x1F, 0x11, 0x08];
        let signature = parse_field_signature(&blob).unwrap();
        assert_eq!(
            signature.modifiers,
            vec![CustomModifier {
                is_optional: false,
                modifier_type: TableIndex::new(TableId::TypeRef, 3),
            }]
        );
        assert_eq!(signature.base, TypeSignature::Simple(SimpleType::I4));
        assert_eq!(encode_field_signature(&signature).unwrap(), blob);
    }

    #[test]
    fn locals() {
        // pinned int32&, string, valuetype TypeDef[0]
        let blob = [0x07, 0x03, 0x45, 0x10, 0x08, 0x0E, 0x11, 0x04];
        let signature = parse_local_var_signature(&blob).unwrap();
        assert_eq!(signature.locals.len(), 3);
        assert!(signature.locals[0].pinned);
        assert!(signature.locals[0].by_ref);
        assert_eq!(
            signature.locals[2].base,
            TypeSignature::ClassOrValue(SignatureClassOrValue {
                is_class: false,
                type_ref: TableIndex::new(TableId::TypeDef, 0),
                generic_arguments: Vec::new(),
            })
        );
        assert_eq!(encode_local_var_signature(&signature).unwrap(), blob);
    }

    #[test]
    fn property_and_method_spec() {
        // instance string this[int32]
        let blob = [0x28, 0x01, 0x0E, 0x08];
        let property = parse_property_signature(&blob).unwrap();
        assert!(property.has_this);
        assert_eq!(property.params.len(), 1);
        assert_eq!(encode_property_signature(&property).unwrap(), blob);

        let blob = [0x0A, 0x02, 0x08, 0x0E];
        let spec = parse_method_spec_signature(&blob).unwrap();
        assert_eq!(spec.generic_args.len(), 2);
        assert_eq!(encode_method_spec_signature(&spec).unwrap(), blob);
    }

    #[test]
    fn function_pointer_and_pointer() {
        // method void *(int32*) as a field type
        let blob = [0x06, 0x1B, 0x00, 0x01, 0x01, 0x0F, 0x08];
        let field = parse_field_signature(&blob).unwrap();
        match &field.base {
            TypeSignature::FunctionPointer(method) => match &method.params[0].base {
                TypeSignature::Pointer(pointer) => {
                    assert_eq!(*pointer.base, TypeSignature::Simple(SimpleType::I4));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(encode_field_signature(&field).unwrap(), blob);
    }

    #[test]
    fn recursion_limit() {
        let mut blob = vec![0x06];
        blob.extend(std::iter::repeat(0x0F).take(MAX_RECURSION_DEPTH + 5));
        blob.push(0x08);
        assert!(matches!(
            parse_field_signature(&blob),
            Err(Error::RecursionLimit(_))
        ));

        // sibling types do not accumulate depth
        let mut blob = vec![0x00, 0x40, 0x01];
        blob.extend(std::iter::repeat(0x08).take(0x40));
        let method = parse_method_signature(&blob).unwrap();
        assert_eq!(method.params.len(), 0x40);
    }

    #[test]
    fn abstract_signatures() {
        assert!(matches!(
            parse_abstract_signature(&[0x06, 0x08]),
            AbstractSignature::Field(_)
        ));
        assert!(matches!(
            parse_abstract_signature(&[0x20, 0x00, 0x01]),
            AbstractSignature::Method(_)
        ));
        assert!(matches!(
            parse_abstract_signature(&[0x07, 0x01, 0x08]),
            AbstractSignature::LocalVariables(_)
        ));

        let garbage = [0x06, 0xEE];
        let raw = parse_abstract_signature(&garbage);
        assert_eq!(raw, AbstractSignature::Raw(garbage.to_vec()));
        assert_eq!(encode_abstract_signature(&raw).unwrap(), garbage);
    }

    #[test]
    fn foreign_type_reference() {
        let signature = TypeSignature::ClassOrValue(SignatureClassOrValue {
            is_class: true,
            type_ref: TableIndex::new(TableId::MethodDef, 0),
            generic_arguments: Vec::new(),
        });
        assert!(matches!(
            encode_type_spec_signature(&signature),
            Err(Error::InvalidArgument(_))
        ));
    }
}
