//! Restorable configurations: bookmarked launches and auto-launch links.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LauncherError;
use crate::patch::{PatchEntry, PatchStore};
use crate::path;
use crate::session::ChartKey;
use crate::url_codec::{decode_patch_query, encode_patch_query};

/// Everything needed to rebuild a launcher session exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorableConfig {
    pub catalog_id: String,
    pub chart_name: String,
    pub chart_version: String,
    pub friendly_name: String,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_config_id: Option<String>,
    #[serde(default)]
    pub patch_entries: Vec<PatchEntry>,
}

// Query parameters of an auto-launch link that are not value paths.
const NAME_PARAM: &str = "name";
const VERSION_PARAM: &str = "version";
const SHARED_PARAM: &str = "shared";
const S3_PARAM: &str = "s3";
const AUTO_LAUNCH_PARAM: &str = "autoLaunch";

impl RestorableConfig {
    pub fn chart_key(&self) -> ChartKey {
        ChartKey {
            catalog_id: self.catalog_id.clone(),
            chart_name: self.chart_name.clone(),
            chart_version: self.chart_version.clone(),
        }
    }

    pub fn patch_store(&self) -> PatchStore {
        PatchStore::from_diff_list(self.patch_entries.iter().cloned())
    }

    /// Query string of an auto-launch link: the launch settings, closed by
    /// `autoLaunch=true`, followed by the encoded patch entries. The catalog
    /// and chart name live in the link's path, not in the query.
    pub fn to_launch_query(&self) -> String {
        let mut settings = vec![
            PatchEntry::set(path![NAME_PARAM], self.friendly_name.clone().into()),
            PatchEntry::set(path![VERSION_PARAM], self.chart_version.clone().into()),
            PatchEntry::set(path![SHARED_PARAM], self.is_shared.into()),
        ];
        if let Some(s3) = &self.s3_config_id {
            settings.push(PatchEntry::set(path![S3_PARAM], s3.clone().into()));
        }
        settings.push(PatchEntry::set(path![AUTO_LAUNCH_PARAM], true.into()));

        let mut query = encode_patch_query(&settings);
        if !self.patch_entries.is_empty() {
            query.push('&');
            query.push_str(&encode_patch_query(&self.patch_entries));
        }
        query
    }

    /// Rebuild a configuration from an auto-launch link.
    ///
    /// Before the `autoLaunch` parameter, the first `name`, `version` or `s3`
    /// holding a string and the first `shared` holding a boolean are launch
    /// settings. Every other entry, and everything after `autoLaunch`, is a
    /// patch entry, so chart values under those top-level keys survive. A
    /// missing `version` leaves `chart_version` empty (latest).
    pub fn from_launch_query(
        catalog_id: &str,
        chart_name: &str,
        query: &str,
    ) -> Result<Self, LauncherError> {
        let mut config = RestorableConfig {
            catalog_id: catalog_id.to_string(),
            chart_name: chart_name.to_string(),
            chart_version: String::new(),
            friendly_name: chart_name.to_string(),
            is_shared: false,
            s3_config_id: None,
            patch_entries: Vec::new(),
        };

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut in_settings = true;
        for entry in decode_patch_query(query)? {
            let setting = match entry.path.segments() {
                [single] if in_settings => single.as_key(),
                _ => None,
            };
            let value = entry.value.as_ref();
            let claimed = match setting {
                Some(AUTO_LAUNCH_PARAM) => {
                    in_settings = false;
                    true
                }
                Some(key @ (NAME_PARAM | VERSION_PARAM | S3_PARAM)) if !seen.contains(key) => {
                    match value.and_then(Value::as_str) {
                        Some(text) => {
                            let text = text.to_string();
                            match key {
                                NAME_PARAM => config.friendly_name = text,
                                VERSION_PARAM => config.chart_version = text,
                                _ => config.s3_config_id = Some(text),
                            }
                            seen.insert(key.to_string());
                            true
                        }
                        None => false,
                    }
                }
                Some(SHARED_PARAM) if !seen.contains(SHARED_PARAM) => {
                    match value.and_then(Value::as_bool) {
                        Some(shared) => {
                            config.is_shared = shared;
                            seen.insert(SHARED_PARAM.to_string());
                            true
                        }
                        None => false,
                    }
                }
                _ => false,
            };
            if !claimed {
                config.patch_entries.push(entry);
            }
        }
        Ok(config)
    }
}
