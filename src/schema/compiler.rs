use super::compiled::{CompiledSchema, PropertyDescriptor};
use super::property::{FieldDecl, PropertyDecl, PropertyKind};
use crate::error::{Result, StateBusError};
use std::collections::{HashMap, HashSet};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Compiles an ordered property declaration list into a flat lane layout
pub struct SchemaCompiler;

impl SchemaCompiler {
    /// Compile property declarations into a layout.
    ///
    /// Each property's offset is the cumulative size of the entries declared
    /// before it. The result is a pure function of `decls`, so every worker
    /// compiling the same list gets the same layout and fingerprint.
    ///
    /// # Errors
    /// [`StateBusError::InvalidSchema`] on duplicate names, empty records, or
    /// zero capacities.
    pub fn compile(decls: &[PropertyDecl]) -> Result<CompiledSchema> {
        let start_time = std::time::Instant::now();

        let mut properties = Vec::with_capacity(decls.len());
        let mut index = HashMap::with_capacity(decls.len());
        let mut offset = 0usize;

        for decl in decls {
            Self::validate(decl)?;

            if index.insert(decl.name.clone(), properties.len()).is_some() {
                return Err(StateBusError::InvalidSchema(format!(
                    "duplicate property '{}'",
                    decl.name
                )));
            }

            let size = decl.kind.lanes();
            properties.push(PropertyDescriptor {
                name: decl.name.clone(),
                kind: decl.kind.clone(),
                offset,
                size,
            });
            offset += size;
        }

        let fingerprint = Self::fingerprint(&properties);

        tracing::debug!(
            properties = properties.len(),
            total_lanes = offset,
            fingerprint = %format!("{:016x}", fingerprint),
            compile_time_us = start_time.elapsed().as_micros() as u64,
            "Compiled shared segment schema"
        );

        Ok(CompiledSchema {
            properties,
            total_lanes: offset,
            fingerprint,
            index,
        })
    }

    /// Reject declarations that would produce an unusable layout
    fn validate(decl: &PropertyDecl) -> Result<()> {
        if decl.name.is_empty() {
            return Err(StateBusError::InvalidSchema(
                "property name must not be empty".to_string(),
            ));
        }

        let invalid = |message: &str| -> Result<()> {
            Err(StateBusError::InvalidSchema(format!(
                "property '{}': {}",
                decl.name, message
            )))
        };

        match &decl.kind {
            PropertyKind::Struct { fields } | PropertyKind::ConfigStruct { fields } => {
                if fields.is_empty() {
                    return invalid("struct has no fields");
                }
                Self::validate_fields(&decl.name, fields)
            }
            PropertyKind::Array {
                record, max_count, ..
            } => {
                if record.is_empty() {
                    return invalid("array record has no fields");
                }
                if *max_count == 0 {
                    return invalid("array max_count must be positive");
                }
                Self::validate_fields(&decl.name, record)
            }
            PropertyKind::Path { max_waypoints } => {
                if *max_waypoints == 0 {
                    return invalid("path max_waypoints must be positive");
                }
                Ok(())
            }
            PropertyKind::RingBuffer { max_messages } => {
                if *max_messages == 0 {
                    return invalid("ring buffer max_messages must be positive");
                }
                Ok(())
            }
        }
    }

    fn validate_fields(property: &str, fields: &[FieldDecl]) -> Result<()> {
        let mut seen = HashSet::new();
        for field in fields {
            if !seen.insert(field.name.as_str()) {
                return Err(StateBusError::InvalidSchema(format!(
                    "property '{}': duplicate field '{}'",
                    property, field.name
                )));
            }
            if field.ty.lanes() == 0 {
                return Err(StateBusError::InvalidSchema(format!(
                    "property '{}': field '{}' has zero length",
                    property, field.name
                )));
            }
        }
        Ok(())
    }

    /// FNV-1a over the parts of the layout that must match across workers
    fn fingerprint(properties: &[PropertyDescriptor]) -> u64 {
        let mut hash = FNV_OFFSET;
        let mut feed = |bytes: &[u8]| {
            for &b in bytes {
                hash ^= b as u64;
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        };

        for prop in properties {
            feed(prop.name.as_bytes());
            feed(&prop.kind.tag().to_le_bytes());
            feed(&(prop.offset as u64).to_le_bytes());
            feed(&(prop.size as u64).to_le_bytes());
        }

        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::property::default_schema;

    fn sample_decls() -> Vec<PropertyDecl> {
        vec![
            PropertyDecl::structure("a", vec![FieldDecl::i32("x")]),
            PropertyDecl::array("b", vec![FieldDecl::u32("id")], 4),
            PropertyDecl::path("c", 2),
        ]
    }

    #[test]
    fn test_offsets_are_cumulative() {
        let schema = SchemaCompiler::compile(&sample_decls()).unwrap();

        let a = schema.descriptor("a").unwrap();
        let b = schema.descriptor("b").unwrap();
        let c = schema.descriptor("c").unwrap();

        assert_eq!((a.offset, a.size), (0, 2));
        assert_eq!((b.offset, b.size), (2, 3 + 4));
        assert_eq!((c.offset, c.size), (9, 13 + 6));
        assert_eq!(schema.total_lanes, 9 + 19);
    }

    #[test]
    fn test_version_lanes() {
        let schema = SchemaCompiler::compile(&sample_decls()).unwrap();
        assert_eq!(schema.descriptor("a").unwrap().version_lane(), Some(1));
        assert_eq!(schema.descriptor("b").unwrap().version_lane(), Some(3));
        assert_eq!(schema.descriptor("c").unwrap().version_lane(), Some(9 + 12));
    }

    #[test]
    fn test_unknown_property_fails_fast() {
        let schema = SchemaCompiler::compile(&sample_decls()).unwrap();
        let err = schema.descriptor("missing").unwrap_err();
        assert!(matches!(err, StateBusError::UnknownProperty(name) if name == "missing"));
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let decls = vec![
            PropertyDecl::structure("a", vec![FieldDecl::i32("x")]),
            PropertyDecl::structure("a", vec![FieldDecl::i32("y")]),
        ];
        assert!(matches!(
            SchemaCompiler::compile(&decls),
            Err(StateBusError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let decls = vec![PropertyDecl::ring_buffer("ring", 0)];
        assert!(SchemaCompiler::compile(&decls).is_err());

        let decls = vec![PropertyDecl::structure(
            "s",
            vec![FieldDecl::string("name", 0)],
        )];
        assert!(SchemaCompiler::compile(&decls).is_err());
    }

    #[test]
    fn test_compile_is_deterministic() {
        let first = SchemaCompiler::compile(&default_schema()).unwrap();
        let second = SchemaCompiler::compile(&default_schema()).unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.properties, second.properties);
    }

    #[test]
    fn test_fingerprint_detects_drift() {
        let mut drifted = sample_decls();
        drifted.swap(0, 1);
        let a = SchemaCompiler::compile(&sample_decls()).unwrap();
        let b = SchemaCompiler::compile(&drifted).unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_empty_schema() {
        let schema = SchemaCompiler::compile(&[]).unwrap();
        assert!(schema.is_empty());
        assert_eq!(schema.total_lanes, 0);
    }
}
