use std::fs;
use std::io;

use git_hash::{hex, ObjectId};

use crate::{LooseError, LooseObjectStore};

impl LooseObjectStore {
    /// All stored objects whose hex name starts with `prefix`.
    ///
    /// With two or more characters only the matching bucket directory is
    /// scanned. The result is sorted.
    pub fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, LooseError> {
        let prefix = prefix.to_ascii_lowercase();
        if !hex::is_hex(&prefix) || prefix.len() > ObjectId::HEX_LEN {
            return Ok(Vec::new());
        }

        let buckets: Vec<String> = if prefix.len() >= 2 {
            vec![prefix[..2].to_string()]
        } else {
            (0..=255u8)
                .map(|b| hex::encode(&[b]))
                .filter(|b| b.starts_with(&prefix))
                .collect()
        };

        let mut found = Vec::new();
        for bucket in buckets {
            self.scan_bucket(&bucket, &prefix, &mut found)?;
        }
        found.sort();
        Ok(found)
    }

    /// Every loose object id, sorted.
    pub fn iter_all(&self) -> Result<Vec<ObjectId>, LooseError> {
        self.prefix_match("")
    }

    fn scan_bucket(
        &self,
        bucket: &str,
        prefix: &str,
        found: &mut Vec<ObjectId>,
    ) -> Result<(), LooseError> {
        let entries = match fs::read_dir(self.objects_dir().join(bucket)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(rest) = name.to_str() else { continue };
            if rest.len() != ObjectId::HEX_LEN - 2 {
                continue;
            }
            let full = format!("{bucket}{rest}");
            if !full.starts_with(prefix) {
                continue;
            }
            if let Ok(oid) = ObjectId::from_hex(&full) {
                found.push(oid);
            }
        }
        Ok(())
    }
}
