use crate::{
    file::io::CilWrite,
    metadata::{
        signatures::{
            AbstractSignature, CustomModifier, SignatureCallingConvention, SignatureField,
            SignatureLocalVariables, SignatureMethod, SignatureMethodSpec, SignatureParameter,
            SignatureProperty, TypeSignature, CALLING_CONVENTION, ELEMENT_TYPE, SIGNATURE_HEADER,
        },
        tables::{TableId, TableIndex},
    },
    Error, Result,
};

fn count(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::InvalidArgument(format!("too many {}: {}", what, len)))
}

/// Append a `TypeDefOrRefOrSpecEncoded` reference.
///
/// # Errors
/// Returns [`crate::Error::InvalidArgument`] for references to other tables.
pub fn encode_type_def_or_ref(index: TableIndex, buffer: &mut Vec<u8>) -> Result<()> {
    let tag = match index.table {
        TableId::TypeDef => 0,
        TableId::TypeRef => 1,
        TableId::TypeSpec => 2,
        other => {
            return Err(Error::InvalidArgument(format!(
                "signature type reference into the {:?} table",
                other
            )))
        }
    };
    buffer.write_compressed_uint(((index.index + 1) << 2) | tag)
}

fn encode_custom_modifiers(modifiers: &[CustomModifier], buffer: &mut Vec<u8>) -> Result<()> {
    for modifier in modifiers {
        buffer.push(if modifier.is_optional {
            ELEMENT_TYPE::CMOD_OPT
        } else {
            ELEMENT_TYPE::CMOD_REQD
        });
        encode_type_def_or_ref(modifier.modifier_type, buffer)?;
    }
    Ok(())
}

/// Append one type.
///
/// # Errors
/// Returns [`crate::Error::InvalidArgument`] for values that have no encoding, such as a
/// type reference into a foreign table.
pub fn encode_type(signature: &TypeSignature, buffer: &mut Vec<u8>) -> Result<()> {
    match signature {
        TypeSignature::Simple(simple) => buffer.push(*simple as u8),
        TypeSignature::SimpleArray(array) => {
            buffer.push(ELEMENT_TYPE::SZARRAY);
            encode_custom_modifiers(&array.modifiers, buffer)?;
            encode_type(&array.base, buffer)?;
        }
        TypeSignature::ComplexArray(array) => {
            buffer.push(ELEMENT_TYPE::ARRAY);
            encode_type(&array.base, buffer)?;
            buffer.write_compressed_uint(array.rank)?;
            buffer.write_compressed_uint(count(array.sizes.len(), "array sizes")?)?;
            for size in &array.sizes {
                buffer.write_compressed_uint(*size)?;
            }
            buffer.write_compressed_uint(count(array.lower_bounds.len(), "lower bounds")?)?;
            for bound in &array.lower_bounds {
                buffer.write_compressed_int(*bound)?;
            }
        }
        TypeSignature::ClassOrValue(class) => {
            let kind = if class.is_class {
                ELEMENT_TYPE::CLASS
            } else {
                ELEMENT_TYPE::VALUETYPE
            };
            if class.generic_arguments.is_empty() {
                buffer.push(kind);
                encode_type_def_or_ref(class.type_ref, buffer)?;
            } else {
                buffer.push(ELEMENT_TYPE::GENERICINST);
                buffer.push(kind);
                encode_type_def_or_ref(class.type_ref, buffer)?;
                buffer.write_compressed_uint(count(
                    class.generic_arguments.len(),
                    "generic arguments",
                )?)?;
                for argument in &class.generic_arguments {
                    encode_type(argument, buffer)?;
                }
            }
        }
        TypeSignature::GenericParameter(parameter) => {
            buffer.push(if parameter.is_method_parameter {
                ELEMENT_TYPE::MVAR
            } else {
                ELEMENT_TYPE::VAR
            });
            buffer.write_compressed_uint(parameter.index)?;
        }
        TypeSignature::FunctionPointer(method) => {
            buffer.push(ELEMENT_TYPE::FNPTR);
            encode_method_signature_into(method, buffer)?;
        }
        TypeSignature::Pointer(pointer) => {
            buffer.push(ELEMENT_TYPE::PTR);
            encode_custom_modifiers(&pointer.modifiers, buffer)?;
            encode_type(&pointer.base, buffer)?;
        }
    }
    Ok(())
}

fn encode_parameter(parameter: &SignatureParameter, buffer: &mut Vec<u8>) -> Result<()> {
    encode_custom_modifiers(&parameter.modifiers, buffer)?;
    if parameter.by_ref {
        buffer.push(ELEMENT_TYPE::BYREF);
    }
    encode_type(&parameter.base, buffer)
}

fn encode_method_signature_into(signature: &SignatureMethod, buffer: &mut Vec<u8>) -> Result<()> {
    let mut convention = match signature.calling_convention {
        SignatureCallingConvention::Default => CALLING_CONVENTION::DEFAULT,
        SignatureCallingConvention::C => CALLING_CONVENTION::C,
        SignatureCallingConvention::StdCall => CALLING_CONVENTION::STDCALL,
        SignatureCallingConvention::ThisCall => CALLING_CONVENTION::THISCALL,
        SignatureCallingConvention::FastCall => CALLING_CONVENTION::FASTCALL,
        SignatureCallingConvention::VarArg => CALLING_CONVENTION::VARARG,
        SignatureCallingConvention::Unmanaged => CALLING_CONVENTION::UNMANAGED,
    };
    if signature.has_this {
        convention |= CALLING_CONVENTION::HASTHIS;
    }
    if signature.explicit_this {
        convention |= CALLING_CONVENTION::EXPLICITTHIS;
    }
    if signature.generic_parameter_count > 0 {
        convention |= CALLING_CONVENTION::GENERIC;
    }
    buffer.push(convention);

    if signature.generic_parameter_count > 0 {
        buffer.write_compressed_uint(signature.generic_parameter_count)?;
    }

    buffer.write_compressed_uint(count(
        signature.params.len() + signature.varargs.len(),
        "parameters",
    )?)?;
    encode_parameter(&signature.return_type, buffer)?;
    for param in &signature.params {
        encode_parameter(param, buffer)?;
    }
    if !signature.varargs.is_empty() {
        buffer.push(ELEMENT_TYPE::SENTINEL);
        for param in &signature.varargs {
            encode_parameter(param, buffer)?;
        }
    }
    Ok(())
}

/// Encode a method signature.
///
/// # Errors
/// See [`encode_type`].
pub fn encode_method_signature(signature: &SignatureMethod) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    encode_method_signature_into(signature, &mut buffer)?;
    Ok(buffer)
}

/// Encode a field signature.
///
/// # Errors
/// See [`encode_type`].
pub fn encode_field_signature(signature: &SignatureField) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::FIELD];
    encode_custom_modifiers(&signature.modifiers, &mut buffer)?;
    if signature.by_ref {
        buffer.push(ELEMENT_TYPE::BYREF);
    }
    encode_type(&signature.base, &mut buffer)?;
    Ok(buffer)
}

/// Encode a property signature.
///
/// # Errors
/// See [`encode_type`].
pub fn encode_property_signature(signature: &SignatureProperty) -> Result<Vec<u8>> {
    let mut head = SIGNATURE_HEADER::PROPERTY;
    if signature.has_this {
        head |= CALLING_CONVENTION::HASTHIS;
    }

    let mut buffer = vec![head];
    buffer.write_compressed_uint(count(signature.params.len(), "indexer parameters")?)?;
    encode_parameter(&signature.property_type, &mut buffer)?;
    for param in &signature.params {
        encode_parameter(param, &mut buffer)?;
    }
    Ok(buffer)
}

/// Encode a local variable signature.
///
/// # Errors
/// See [`encode_type`].
pub fn encode_local_var_signature(signature: &SignatureLocalVariables) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::LOCAL_SIG];
    buffer.write_compressed_uint(count(signature.locals.len(), "locals")?)?;
    for local in &signature.locals {
        encode_custom_modifiers(&local.modifiers, &mut buffer)?;
        if local.pinned {
            buffer.push(ELEMENT_TYPE::PINNED);
        }
        if local.by_ref {
            buffer.push(ELEMENT_TYPE::BYREF);
        }
        encode_type(&local.base, &mut buffer)?;
    }
    Ok(buffer)
}

/// Encode a `TypeSpec` signature.
///
/// # Errors
/// See [`encode_type`].
pub fn encode_type_spec_signature(signature: &TypeSignature) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    encode_type(signature, &mut buffer)?;
    Ok(buffer)
}

/// Encode a `MethodSpec` instantiation.
///
/// # Errors
/// See [`encode_type`].
pub fn encode_method_spec_signature(signature: &SignatureMethodSpec) -> Result<Vec<u8>> {
    let mut buffer = vec![SIGNATURE_HEADER::METHOD_SPEC];
    buffer.write_compressed_uint(count(signature.generic_args.len(), "generic arguments")?)?;
    for argument in &signature.generic_args {
        encode_type(argument, &mut buffer)?;
    }
    Ok(buffer)
}

/// Encode any signature kind, raw blobs are emitted unchanged.
///
/// # Errors
/// See [`encode_type`].
pub fn encode_abstract_signature(signature: &AbstractSignature) -> Result<Vec<u8>> {
    match signature {
        AbstractSignature::Field(field) => encode_field_signature(field),
        AbstractSignature::Method(method) => encode_method_signature(method),
        AbstractSignature::Property(property) => encode_property_signature(property),
        AbstractSignature::LocalVariables(locals) => encode_local_var_signature(locals),
        AbstractSignature::MethodSpec(spec) => encode_method_spec_signature(spec),
        AbstractSignature::Raw(data) => Ok(data.clone()),
    }
}
