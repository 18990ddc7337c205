//! # NovusPack - Package Container with Tagged Metadata
//!
//! `novuspack` reads, writes, and validates NovusPack packages: a small
//! fixed header, an entry table of files and directories, and an optional
//! trailing comment. Features include:
//!
//! - **Typed tags** on files and directories, inherited down the directory tree
//! - **Special metadata files** (update manifests, install scripts, package info)
//! - **Security envelope** per file: checksums, Ed25519 signatures, AES-256-GCM
//! - **Package signature** over the header, comment, and every entry record
//! - **Validation** that reports every failure with its path and offset
//!
//! ## Quick Start
//!
//! ```rust
//! use novuspack::{Package, PackageConfig, TagValue, ValidationOptions, Result};
//!
//! # fn main() -> Result<()> {
//! let pkg = Package::create(PackageConfig::default())?;
//!
//! pkg.add_directory("textures")?;
//! pkg.set_tag("textures", "category", "texture")?;
//! pkg.add_file("textures/wall.png", vec![0u8; 64])?;
//! pkg.set_comment("Build 42")?;
//!
//! // Files inherit tags from their directory
//! let found = pkg.get_files_by_tag("category", &TagValue::from("texture"))?;
//! assert_eq!(found[0].path, "/textures/wall.png");
//!
//! let report = pkg.validate(&ValidationOptions::new())?;
//! assert!(report.is_valid());
//! # Ok(())
//! # }
//! ```
//!
//! ## Builder
//!
//! ```rust,no_run
//! use novuspack::{ChecksumAlgorithm, PackageBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let pkg = PackageBuilder::new()
//!     .checksum_algorithm(ChecksumAlgorithm::Xxh3)
//!     .max_comment_length(1024)
//!     .comment("nightly")
//!     .path("/data/game.npk")
//!     .build()?;
//!
//! pkg.add_file("readme.txt", b"content".to_vec())?;
//! pkg.close()?;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod catalog;
pub(crate) mod codec;
pub mod comment;
pub mod config;
pub mod error;
pub mod header;
pub mod inheritance;
pub mod io;
pub mod metadata;
pub mod package;
pub mod path;
pub mod query;
pub mod security;
pub mod tag;
pub mod validator;

pub use crate::cancel::CancellationToken;
pub use crate::catalog::{type_codes, DirectoryEntry, Entry, EntryKind, EntryTable, FileEntry};
pub use crate::comment::{comment_digest, sanitize_comment, SanitizedComment};
pub use crate::config::PackageConfig;
pub use crate::error::{NovusPackError, Result, SecurityErrorKind};
pub use crate::header::{PackageHeader, FORMAT_VERSION, HEADER_SIZE};
pub use crate::metadata::special::{
    PackageInfo, PackageRelationships, Relationship, RelationshipKind, SpecialFile, UpdateManifest,
};
pub use crate::metadata::DirectoryMetadata;
pub use crate::package::{AccessMode, FileOptions, Package, PackageBuilder, PackageStats};
pub use crate::security::{
    Checksum, ChecksumAlgorithm, EncryptionKey, EncryptionStatus, EncryptionType,
    EncryptionValidator, SecurityStatus, SignatureBlock, ValidationAspect, ValidationFailure, ValidationReport,
};
pub use crate::tag::{TagMap, TagValue, TagValueType};
pub use crate::validator::{validate_bytes, ValidationOptions};
