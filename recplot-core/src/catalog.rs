//! Reference catalog: contig → (MAG id, contig id, length)
//!
//! Built once from the contig lengths and the contig → MAG membership,
//! persisted into the `lookup` and `contig_lengths` relations, and passed
//! around afterwards as an immutable value.

use indexmap::IndexMap;
use rusqlite::Connection;
use std::collections::HashMap;
use thiserror::Error;

use crate::db;
use crate::types::{ContigId, ContigInfo, GenomicPos, MagId, MagInfo};

/// Contig name → length in bases, in FASTA order.
pub type ContigLengths = IndexMap<String, GenomicPos>;
/// Contig name → MAG name, in membership-file order.
pub type Membership = IndexMap<String, String>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Contig {contig} is assigned to MAG {mag} but has no length entry")]
    Reference { contig: String, mag: String },
    #[error("Membership is empty: no contigs assigned to any MAG")]
    EmptyMembership,
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    contigs: Vec<ContigInfo>,
    mags: Vec<MagInfo>,
    contig_index: HashMap<String, ContigId>,
    mag_index: HashMap<String, MagId>,
}

impl Catalog {
    /// Assign MAG ids (first-seen order) and contig ids (global, sequential),
    /// both starting at 1, walking `membership` in its insertion order.
    pub fn build(lengths: &ContigLengths, membership: &Membership) -> Result<Self, CatalogError> {
        if membership.is_empty() {
            return Err(CatalogError::EmptyMembership);
        }

        let mut catalog = Catalog::default();
        for (contig_name, mag_name) in membership {
            let length = *lengths.get(contig_name).ok_or_else(|| CatalogError::Reference {
                contig: contig_name.clone(),
                mag: mag_name.clone(),
            })?;
            catalog.insert(mag_name, contig_name, length);
        }

        let unassigned = lengths
            .keys()
            .filter(|name| !catalog.contig_index.contains_key(*name))
            .count();
        if unassigned > 0 {
            log::warn!("{} contigs have a length but no MAG assignment; ignoring them", unassigned);
        }

        log::info!(
            "Catalog built: {} MAGs, {} contigs",
            catalog.mags.len(),
            catalog.contigs.len()
        );
        Ok(catalog)
    }

    fn insert(&mut self, mag_name: &str, contig_name: &str, length: GenomicPos) {
        let next_mag = self.mags.len() as MagId + 1;
        let mag_id = *self.mag_index.entry(mag_name.to_string()).or_insert(next_mag);
        if mag_id == next_mag {
            self.mags.push(MagInfo {
                id: mag_id,
                name: mag_name.to_string(),
                contigs: Vec::new(),
            });
        }

        let contig_id = self.contigs.len() as ContigId + 1;
        self.contigs.push(ContigInfo {
            id: contig_id,
            name: contig_name.to_string(),
            length,
            mag_id,
        });
        self.contig_index.insert(contig_name.to_string(), contig_id);
        self.mags[(mag_id - 1) as usize].contigs.push(contig_id);
    }

    /// Replace the database contents with this catalog.
    ///
    /// Contig ids are only meaningful for the catalog that assigned them, so
    /// every sample, membership row and hit is discarded as well.
    pub fn persist(&self, conn: &mut Connection) -> Result<(), CatalogError> {
        db::reset(conn)?;

        let tx = conn.transaction()?;
        {
            let mut lookup = tx.prepare(
                "INSERT INTO lookup (mag_name, mag_id, contig_name, contig_id) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut lengths = tx.prepare(
                "INSERT INTO contig_lengths (mag_id, contig_id, length) VALUES (?1, ?2, ?3)",
            )?;
            for contig in &self.contigs {
                let mag = &self.mags[(contig.mag_id - 1) as usize];
                lookup.execute((&mag.name, mag.id, &contig.name, contig.id))?;
                lengths.execute((mag.id, contig.id, contig.length as i64))?;
            }
        }
        tx.commit()?;

        log::info!("Catalog persisted ({} contigs)", self.contigs.len());
        Ok(())
    }

    /// Reload a catalog previously written by [`Catalog::persist`].
    pub fn load(conn: &Connection) -> Result<Self, CatalogError> {
        let mut statement = conn.prepare(
            "SELECT l.mag_name, l.mag_id, l.contig_name, l.contig_id, c.length
             FROM lookup l JOIN contig_lengths c ON l.contig_id = c.contig_id
             ORDER BY l.contig_id",
        )?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, MagId>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, ContigId>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut catalog = Catalog::default();
        for row in rows {
            let (mag_name, mag_id, contig_name, contig_id, length) = row?;
            catalog.insert(&mag_name, &contig_name, length as GenomicPos);
            debug_assert_eq!(catalog.mag_index[&mag_name], mag_id);
            debug_assert_eq!(catalog.contig_index[&contig_name], contig_id);
        }
        Ok(catalog)
    }

    pub fn contig(&self, name: &str) -> Option<&ContigInfo> {
        self.contig_index.get(name).and_then(|&id| self.contig_by_id(id))
    }

    pub fn contig_by_id(&self, id: ContigId) -> Option<&ContigInfo> {
        id.checked_sub(1).and_then(|index| self.contigs.get(index as usize))
    }

    pub fn mag(&self, name: &str) -> Option<&MagInfo> {
        self.mag_index.get(name).and_then(|&id| self.mag_by_id(id))
    }

    pub fn mag_by_id(&self, id: MagId) -> Option<&MagInfo> {
        id.checked_sub(1).and_then(|index| self.mags.get(index as usize))
    }

    /// Contigs of a MAG, in catalog order.
    pub fn contigs_of<'a>(&'a self, mag: &'a MagInfo) -> impl Iterator<Item = &'a ContigInfo> + 'a {
        mag.contigs.iter().filter_map(move |&id| self.contig_by_id(id))
    }

    pub fn contigs(&self) -> &[ContigInfo] {
        &self.contigs
    }

    pub fn mags(&self) -> &[MagInfo] {
        &self.mags
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }
}
