use tracing::warn;

use crate::{
    file::parser::Parser,
    metadata::signatures::{
        AbstractSignature, CustomModifier, SignatureArray, SignatureCallingConvention,
        SignatureClassOrValue, SignatureField, SignatureGenericParameter, SignatureLocalVariable,
        SignatureLocalVariables, SignatureMethod, SignatureMethodSpec, SignatureParameter,
        SignaturePointer, SignatureProperty, SignatureSzArray, SimpleType, TypeSignature,
        CALLING_CONVENTION, ELEMENT_TYPE, SIGNATURE_HEADER,
    },
    Error::RecursionLimit,
    Result,
};

/// Deepest type nesting accepted before a signature is rejected.
pub const MAX_RECURSION_DEPTH: usize = 50;

/// Recursive descent decoder for the signature grammars of ECMA-335 §II.23.2.
pub struct SignatureParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> SignatureParser<'a> {
    /// Create a parser over one signature blob.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureParser {
            parser: Parser::new(data),
            depth: 0,
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Parse one type.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown element types,
    /// [`crate::Error::RecursionLimit`] for types nested too deep and
    /// [`crate::Error::OutOfBounds`] on truncated data.
    pub fn parse_type(&mut self) -> Result<TypeSignature> {
        self.enter()?;
        let result = self.parse_type_inner();
        self.leave();
        result
    }

    fn parse_type_inner(&mut self) -> Result<TypeSignature> {
        let element_type = self.parser.read_le::<u8>()?;
        if let Some(simple) = SimpleType::from_repr(element_type) {
            return Ok(TypeSignature::Simple(simple));
        }

        match element_type {
            ELEMENT_TYPE::PTR => Ok(TypeSignature::Pointer(SignaturePointer {
                modifiers: self.parse_custom_mods()?,
                base: Box::new(self.parse_type()?),
            })),
            ELEMENT_TYPE::VALUETYPE | ELEMENT_TYPE::CLASS => {
                Ok(TypeSignature::ClassOrValue(SignatureClassOrValue {
                    is_class: element_type == ELEMENT_TYPE::CLASS,
                    type_ref: self.parser.read_compressed_token()?,
                    generic_arguments: Vec::new(),
                }))
            }
            ELEMENT_TYPE::VAR | ELEMENT_TYPE::MVAR => {
                Ok(TypeSignature::GenericParameter(SignatureGenericParameter {
                    is_method_parameter: element_type == ELEMENT_TYPE::MVAR,
                    index: self.parser.read_compressed_uint()?,
                }))
            }
            ELEMENT_TYPE::ARRAY => {
                let base = Box::new(self.parse_type()?);
                let rank = self.parser.read_compressed_uint()?;

                let size_count = self.parser.read_compressed_uint()?;
                let mut sizes = Vec::with_capacity(size_count.min(rank) as usize);
                for _ in 0..size_count {
                    sizes.push(self.parser.read_compressed_uint()?);
                }

                let bound_count = self.parser.read_compressed_uint()?;
                let mut lower_bounds = Vec::with_capacity(bound_count.min(rank) as usize);
                for _ in 0..bound_count {
                    lower_bounds.push(self.parser.read_compressed_int()?);
                }

                Ok(TypeSignature::ComplexArray(SignatureArray {
                    base,
                    rank,
                    sizes,
                    lower_bounds,
                }))
            }
            ELEMENT_TYPE::GENERICINST => {
                let kind = self.parser.read_le::<u8>()?;
                if kind != ELEMENT_TYPE::CLASS && kind != ELEMENT_TYPE::VALUETYPE {
                    return Err(malformed_error!(
                        "GENERICINST - Next byte is not CLASS or VALUETYPE - {}",
                        kind
                    ));
                }

                let type_ref = self.parser.read_compressed_token()?;
                let argument_count = self.parser.read_compressed_uint()?;
                if argument_count == 0 {
                    return Err(malformed_error!("GENERICINST without arguments"));
                }

                let mut generic_arguments = Vec::with_capacity(argument_count.min(64) as usize);
                for _ in 0..argument_count {
                    generic_arguments.push(self.parse_type()?);
                }

                Ok(TypeSignature::ClassOrValue(SignatureClassOrValue {
                    is_class: kind == ELEMENT_TYPE::CLASS,
                    type_ref,
                    generic_arguments,
                }))
            }
            ELEMENT_TYPE::FNPTR => Ok(TypeSignature::FunctionPointer(Box::new(
                self.parse_method_signature()?,
            ))),
            ELEMENT_TYPE::SZARRAY => Ok(TypeSignature::SimpleArray(SignatureSzArray {
                modifiers: self.parse_custom_mods()?,
                base: Box::new(self.parse_type()?),
            })),
            _ => Err(malformed_error!(
                "Unsupported element type in signature - 0x{:02x}",
                element_type
            )),
        }
    }

    fn parse_custom_mods(&mut self) -> Result<Vec<CustomModifier>> {
        let mut modifiers = Vec::new();
        while self.parser.has_more_data() {
            let is_optional = match self.parser.peek_byte()? {
                ELEMENT_TYPE::CMOD_OPT => true,
                ELEMENT_TYPE::CMOD_REQD => false,
                _ => break,
            };
            self.parser.advance()?;
            modifiers.push(CustomModifier {
                is_optional,
                modifier_type: self.parser.read_compressed_token()?,
            });
        }
        Ok(modifiers)
    }

    fn parse_param(&mut self) -> Result<SignatureParameter> {
        let modifiers = self.parse_custom_mods()?;
        let by_ref = if self.parser.peek_byte()? == ELEMENT_TYPE::BYREF {
            self.parser.advance()?;
            true
        } else {
            false
        };

        Ok(SignatureParameter {
            modifiers,
            by_ref,
            base: self.parse_type()?,
        })
    }

    /// Parse a method definition, reference or call site signature.
    ///
    /// # Errors
    /// Returns an error for malformed or truncated data.
    pub fn parse_method_signature(&mut self) -> Result<SignatureMethod> {
        self.enter()?;
        let result = self.parse_method_signature_inner();
        self.leave();
        result
    }

    fn parse_method_signature_inner(&mut self) -> Result<SignatureMethod> {
        let convention = self.parser.read_le::<u8>()?;
        let calling_convention = match convention & CALLING_CONVENTION::KIND_MASK {
            CALLING_CONVENTION::DEFAULT => SignatureCallingConvention::Default,
            CALLING_CONVENTION::C => SignatureCallingConvention::C,
            CALLING_CONVENTION::STDCALL => SignatureCallingConvention::StdCall,
            CALLING_CONVENTION::THISCALL => SignatureCallingConvention::ThisCall,
            CALLING_CONVENTION::FASTCALL => SignatureCallingConvention::FastCall,
            CALLING_CONVENTION::VARARG => SignatureCallingConvention::VarArg,
            CALLING_CONVENTION::UNMANAGED => SignatureCallingConvention::Unmanaged,
            other => {
                return Err(malformed_error!(
                    "Not a method signature - calling convention 0x{:02x}",
                    other
                ))
            }
        };

        let generic_parameter_count = if convention & CALLING_CONVENTION::GENERIC != 0 {
            self.parser.read_compressed_uint()?
        } else {
            0
        };

        let param_count = self.parser.read_compressed_uint()?;
        let return_type = self.parse_param()?;

        let mut params = Vec::with_capacity(param_count.min(256) as usize);
        let mut varargs = Vec::new();
        let mut after_sentinel = false;
        for _ in 0..param_count {
            if !after_sentinel && self.parser.peek_byte()? == ELEMENT_TYPE::SENTINEL {
                self.parser.advance()?;
                after_sentinel = true;
            }

            let param = self.parse_param()?;
            if after_sentinel {
                varargs.push(param);
            } else {
                params.push(param);
            }
        }

        Ok(SignatureMethod {
            has_this: convention & CALLING_CONVENTION::HASTHIS != 0,
            explicit_this: convention & CALLING_CONVENTION::EXPLICITTHIS != 0,
            calling_convention,
            generic_parameter_count,
            return_type,
            params,
            varargs,
        })
    }

    /// Parse a field signature.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob is not a field signature.
    pub fn parse_field_signature(&mut self) -> Result<SignatureField> {
        let head = self.parser.read_le::<u8>()?;
        if head & CALLING_CONVENTION::KIND_MASK != SIGNATURE_HEADER::FIELD {
            return Err(malformed_error!(
                "SignatureField - invalid start - {}",
                head
            ));
        }

        let param = self.parse_param()?;
        Ok(SignatureField {
            modifiers: param.modifiers,
            by_ref: param.by_ref,
            base: param.base,
        })
    }

    /// Parse a property signature.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob is not a property signature.
    pub fn parse_property_signature(&mut self) -> Result<SignatureProperty> {
        let head = self.parser.read_le::<u8>()?;
        if head & CALLING_CONVENTION::KIND_MASK != SIGNATURE_HEADER::PROPERTY {
            return Err(malformed_error!(
                "SignatureProperty - invalid start - {}",
                head
            ));
        }

        let param_count = self.parser.read_compressed_uint()?;
        let property_type = self.parse_param()?;

        let mut params = Vec::with_capacity(param_count.min(256) as usize);
        for _ in 0..param_count {
            params.push(self.parse_param()?);
        }

        Ok(SignatureProperty {
            has_this: head & CALLING_CONVENTION::HASTHIS != 0,
            property_type,
            params,
        })
    }

    /// Parse a local variable signature.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob is not a local variable signature.
    pub fn parse_local_var_signature(&mut self) -> Result<SignatureLocalVariables> {
        let head = self.parser.read_le::<u8>()?;
        if head != SIGNATURE_HEADER::LOCAL_SIG {
            return Err(malformed_error!(
                "SignatureLocalVar - invalid start - {}",
                head
            ));
        }

        let count = self.parser.read_compressed_uint()?;
        let mut locals = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let mut modifiers = Vec::new();
            let mut pinned = false;
            loop {
                match self.parser.peek_byte()? {
                    ELEMENT_TYPE::CMOD_OPT | ELEMENT_TYPE::CMOD_REQD => {
                        modifiers.extend(self.parse_custom_mods()?);
                    }
                    ELEMENT_TYPE::PINNED => {
                        self.parser.advance()?;
                        pinned = true;
                    }
                    _ => break,
                }
            }

            let by_ref = if self.parser.peek_byte()? == ELEMENT_TYPE::BYREF {
                self.parser.advance()?;
                true
            } else {
                false
            };

            locals.push(SignatureLocalVariable {
                modifiers,
                pinned,
                by_ref,
                base: self.parse_type()?,
            });
        }

        Ok(SignatureLocalVariables { locals })
    }

    /// Parse a `TypeSpec` signature, which is a bare type.
    ///
    /// # Errors
    /// Same as [`SignatureParser::parse_type`].
    pub fn parse_type_spec_signature(&mut self) -> Result<TypeSignature> {
        self.parse_type()
    }

    /// Parse a `MethodSpec` instantiation.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob is not a generic instantiation.
    pub fn parse_method_spec_signature(&mut self) -> Result<SignatureMethodSpec> {
        let head = self.parser.read_le::<u8>()?;
        if head != SIGNATURE_HEADER::METHOD_SPEC {
            return Err(malformed_error!(
                "SignatureMethodSpec - invalid start - {}",
                head
            ));
        }

        let count = self.parser.read_compressed_uint()?;
        let mut generic_args = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            generic_args.push(self.parse_type()?);
        }

        Ok(SignatureMethodSpec { generic_args })
    }

    /// Parse a blob whose kind is given by its first byte. Failures are reported to the
    /// caller, see [`parse_abstract_signature`] for the lenient form.
    ///
    /// # Errors
    /// Returns an error for malformed or truncated data.
    pub fn parse_any(&mut self) -> Result<AbstractSignature> {
        let head = self.parser.peek_byte()?;
        match head & CALLING_CONVENTION::KIND_MASK {
            SIGNATURE_HEADER::FIELD => Ok(AbstractSignature::Field(self.parse_field_signature()?)),
            SIGNATURE_HEADER::LOCAL_SIG => Ok(AbstractSignature::LocalVariables(
                self.parse_local_var_signature()?,
            )),
            SIGNATURE_HEADER::PROPERTY => Ok(AbstractSignature::Property(
                self.parse_property_signature()?,
            )),
            SIGNATURE_HEADER::METHOD_SPEC => Ok(AbstractSignature::MethodSpec(
                self.parse_method_spec_signature()?,
            )),
            _ => Ok(AbstractSignature::Method(self.parse_method_signature()?)),
        }
    }

    /// Number of bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.parser.pos()
    }
}

/// Decode a method signature blob.
///
/// # Errors
/// See [`SignatureParser::parse_method_signature`].
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    SignatureParser::new(data).parse_method_signature()
}

/// Decode a field signature blob.
///
/// # Errors
/// See [`SignatureParser::parse_field_signature`].
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    SignatureParser::new(data).parse_field_signature()
}

/// Decode a property signature blob.
///
/// # Errors
/// See [`SignatureParser::parse_property_signature`].
pub fn parse_property_signature(data: &[u8]) -> Result<SignatureProperty> {
    SignatureParser::new(data).parse_property_signature()
}

/// Decode a local variable signature blob.
///
/// # Errors
/// See [`SignatureParser::parse_local_var_signature`].
pub fn parse_local_var_signature(data: &[u8]) -> Result<SignatureLocalVariables> {
    SignatureParser::new(data).parse_local_var_signature()
}

/// Decode a `TypeSpec` blob.
///
/// # Errors
/// See [`SignatureParser::parse_type`].
pub fn parse_type_spec_signature(data: &[u8]) -> Result<TypeSignature> {
    SignatureParser::new(data).parse_type_spec_signature()
}

/// Decode a `MethodSpec` blob.
///
/// # Errors
/// See [`SignatureParser::parse_method_spec_signature`].
pub fn parse_method_spec_signature(data: &[u8]) -> Result<SignatureMethodSpec> {
    SignatureParser::new(data).parse_method_spec_signature()
}

/// Decode a blob of any signature kind, keeping it as [`AbstractSignature::Raw`] if it does
/// not decode.
#[must_use]
pub fn parse_abstract_signature(data: &[u8]) -> AbstractSignature {
    match SignatureParser::new(data).parse_any() {
        Ok(signature) => signature,
        Err(error) => {
            warn!("keeping undecodable signature blob verbatim: {}", error);
            AbstractSignature::Raw(data.to_vec())
        }
    }
}
