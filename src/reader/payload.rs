//! Data referenced by the tables but stored outside of the metadata.

use tracing::{trace, warn};

use crate::{
    file::{
        pe::{
            debug::{DebugDirectory, DebugInformation, DEBUG_DIRECTORY_SIZE},
            DataDirectoryKind,
        },
        File,
    },
    metadata::{
        cor20header::Cor20Header,
        method::MethodBody,
        resource::{read_embedded_resource, ManifestResourceData},
        streams::UserStrings,
        tables::{
            MetadataTables, MethodImplAttributes, RawValueStorage, TableId,
            METHOD_IMPL_CODE_TYPE_MASK,
        },
    },
    Result,
};

/// Decode the IL body of every `MethodDef` row with an RVA.
///
/// Native and runtime-provided methods keep `None` even when an RVA is present.
pub(crate) fn load_method_bodies(
    file: &File,
    raw: &RawValueStorage<u32>,
    user_strings: &UserStrings,
    tables: &mut MetadataTables,
) -> Result<()> {
    for (row, method) in (0u32..).zip(tables.method_def.iter_mut()) {
        let rva = raw.get(TableId::MethodDef, row, 0).unwrap_or(0);
        if rva == 0 {
            continue;
        }

        let code_type = method.impl_flags.bits() & METHOD_IMPL_CODE_TYPE_MASK;
        if code_type == MethodImplAttributes::NATIVE.bits()
            || code_type == MethodImplAttributes::RUNTIME.bits()
        {
            trace!(method = %method.name, rva, "skipping non-IL body");
            continue;
        }

        let data = file.data_from_rva(rva).ok_or_else(|| {
            malformed_error!("Body of method {} at RVA 0x{:x} is not mapped", method.name, rva)
        })?;
        method.body = Some(MethodBody::decode(data, user_strings)?);
    }
    Ok(())
}

/// Copy the initial data of every `FieldRVA` row. The size comes from the field type; data
/// that cannot be sized or located is left empty.
pub(crate) fn load_field_data(file: &File, raw: &RawValueStorage<u32>, tables: &mut MetadataTables) {
    let sizes: Vec<Option<u32>> = tables
        .field_rva
        .iter()
        .map(|row| tables.field_data_size(row.field.index))
        .collect();

    for ((row, field_rva), size) in (0u32..).zip(tables.field_rva.iter_mut()).zip(sizes) {
        let rva = raw.get(TableId::FieldRVA, row, 0).unwrap_or(0);
        let Some(size) = size else {
            warn!(field = field_rva.field.index, "cannot determine the size of field data");
            continue;
        };

        match file.data_at_rva(rva, size as usize) {
            Ok(data) => field_rva.data = data.to_vec(),
            Err(error) => {
                warn!(%error, field = field_rva.field.index, rva, "field data not readable");
            }
        }
    }
}

/// Copy the content of every embedded manifest resource out of the CLI resources directory.
pub(crate) fn load_resources(
    file: &File,
    cor20: &Cor20Header,
    raw: &RawValueStorage<u32>,
    tables: &mut MetadataTables,
) -> Result<()> {
    let embedded = tables
        .manifest_resource
        .iter()
        .any(|resource| matches!(resource.data, ManifestResourceData::Embedded(_)));
    if !embedded {
        return Ok(());
    }

    let directory = file.data_at_rva(cor20.resources.rva, cor20.resources.size as usize)?;
    for (row, resource) in (0u32..).zip(tables.manifest_resource.iter_mut()) {
        if let ManifestResourceData::Embedded(data) = &mut resource.data {
            let offset = raw.get(TableId::ManifestResource, row, 0).unwrap_or(0);
            *data = read_embedded_resource(directory, offset)?.to_vec();
        }
    }
    Ok(())
}

/// Content of the strong-name signature slot, empty if the image has none or it is unmapped.
pub(crate) fn read_strong_name_signature(file: &File, cor20: &Cor20Header) -> Vec<u8> {
    let slot = cor20.strong_name_signature;
    if slot.is_empty() {
        return Vec::new();
    }

    match file.data_at_rva(slot.rva, slot.size as usize) {
        Ok(data) => data.to_vec(),
        Err(error) => {
            warn!(%error, rva = slot.rva, "strong name signature not readable");
            Vec::new()
        }
    }
}

/// The first debug directory entry and its data.
pub(crate) fn read_debug_information(file: &File) -> Option<DebugInformation> {
    let directory = file
        .headers()
        .optional
        .data_directory(DataDirectoryKind::Debug);
    if directory.is_empty() || (directory.size as usize) < DEBUG_DIRECTORY_SIZE {
        return None;
    }

    let entry = match file
        .data_at_rva(directory.rva, DEBUG_DIRECTORY_SIZE)
        .and_then(DebugDirectory::read)
    {
        Ok(entry) => entry,
        Err(error) => {
            warn!(%error, rva = directory.rva, "debug directory not readable");
            return None;
        }
    };

    let data = match file.data_slice(
        entry.pointer_to_raw_data as usize,
        entry.size_of_data as usize,
    ) {
        Ok(data) => data.to_vec(),
        Err(error) => {
            warn!(%error, "debug data not readable");
            Vec::new()
        }
    };

    Some(DebugInformation {
        directory: entry,
        data,
    })
}
