//! Attack-pattern corpus
//!
//! Builds the small curated corpus the retriever draws evidence from: a
//! handful of human-written pattern sentences per label, sampled into M
//! variants each. Every second variant carries a fixed indicator suffix to
//! widen lexical coverage.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::types::{Label, Passage};

/// Suffix appended to every second variant
pub const VARIANT_SUFFIX: &str = " Indices : fréquence, IP, device.";

/// Default number of variants per label
pub const DEFAULT_PASSAGES_PER_LABEL: usize = 12;

/// Template pool for a label
pub fn templates(label: Label) -> &'static [&'static str] {
    match label {
        Label::CredentialStuffing => &[
            "Plusieurs tentatives de connexion échouées provenant de différentes IP sur une courte période. Souvent sur le même compte.",
            "Échecs rapides sur le même identifiant avec IP variées — pattern typique de credential stuffing.",
            "Single failed login attempts spread across many distinct IPs, typical of credential stuffing with leaked password lists.",
        ],
        Label::BruteForce => &[
            "Tentatives très rapides et répétées sur un même compte depuis la même IP ou plage IP — brute-force.",
            "Nombre important d'essais mot de passe successifs sur un compte, sans variation IP notable.",
            "Many failed password attempts in a few minutes against one account from a single IP: brute force.",
        ],
        Label::PhishingAttempt => &[
            "Connexion depuis un domaine ou une IP suspecte souvent corrélée à un message de phishing.",
            "Comportement inhabituel après réception d'un email frauduleux : login depuis nouveau device.",
            "Login from a new device shortly after suspicious messaging, consistent with credentials stolen by phishing.",
        ],
        Label::SessionHijack => &[
            "Changement brusque de device ou IP immédiatement après une authentification réussie — possible détournement de session.",
            "Connexion depuis une géolocalisation inattendue après un login réussit; pattern divergence du profil normal.",
            "Successful session reused from an impossible travel location or an unfamiliar device: session hijack or account takeover.",
        ],
        Label::MalwareActivity => &[
            "Actions inhabituelles sur le compte (ex: exécution de scripts, accès à ressources multiples) pouvant indiquer la présence d'un malware.",
            "Accès automatique et répété à des ressources depuis un device particulier — suspicion d'activité malveillante.",
            "Automated repeated access to many resources from one device, suggesting malware running under the user session.",
        ],
        Label::InsiderThreat => &[
            "Accès ou modifications de ressources sensibles par un utilisateur interne en dehors de son rôle habituel.",
            "Téléchargements massifs ou accès hors horaire d'un compte interne — comportement anormal.",
            "Internal account accessing sensitive resources outside its usual role or working hours.",
        ],
        Label::Normal => &[
            "Login réussi depuis un device connu; comportements cohérents avec l'historique utilisateur.",
            "Échec isolé de mot de passe puis succès depuis le même device — comportement normal.",
            "Successful login from a known device and usual location, consistent with the user history.",
        ],
    }
}

/// Corpus generator
#[derive(Debug, Clone)]
pub struct CorpusBuilder {
    passages_per_label: usize,
    seed: u64,
}

impl Default for CorpusBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PASSAGES_PER_LABEL, 42)
    }
}

impl CorpusBuilder {
    /// `passages_per_label` is raised to 1 so every label is represented
    pub fn new(passages_per_label: usize, seed: u64) -> Self {
        Self {
            passages_per_label: passages_per_label.max(1),
            seed,
        }
    }

    /// Generate the corpus; identical seeds give identical corpora
    pub fn build(&self) -> Vec<Passage> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut passages = Vec::with_capacity(Label::ALL.len() * self.passages_per_label);

        for label in Label::ALL {
            let pool = templates(label);
            for i in 0..self.passages_per_label {
                let mut content = pool.choose(&mut rng).copied().unwrap_or_default().to_string();
                if i % 2 == 0 {
                    content.push_str(VARIANT_SUFFIX);
                }
                passages.push(Passage {
                    passage_id: format!("{}_p{:02}", label, i + 1),
                    doc_id: format!("{}_doc", label),
                    content,
                    tags: vec![label],
                });
            }
        }

        passages
    }
}

/// Write the corpus as pretty JSON
pub fn save_passages(path: &Path, passages: &[Passage]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, passages).map_err(|e| PipelineError::json(path, e))?;
    writer.flush().map_err(|e| PipelineError::io(path, e))?;
    info!("Wrote {} corpus passages to {}", passages.len(), path.display());
    Ok(())
}

/// Load a corpus, dropping passages without content or tags
pub fn load_passages(path: &Path) -> Result<Vec<Passage>> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let passages: Vec<Passage> =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| PipelineError::json(path, e))?;

    let total = passages.len();
    let valid: Vec<Passage> = passages
        .into_iter()
        .filter(|p| {
            let ok = p.is_valid();
            if !ok {
                warn!("Dropping passage {}: empty content or no tags", p.passage_id);
            }
            ok
        })
        .collect();

    if valid.len() < total {
        warn!("{} of {} passages dropped from {}", total - valid.len(), total, path.display());
    }
    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    #[test]
    fn test_every_label_covered() {
        let passages = CorpusBuilder::default().build();
        assert_eq!(passages.len(), Label::ALL.len() * DEFAULT_PASSAGES_PER_LABEL);
        for label in Label::ALL {
            assert!(passages.iter().any(|p| p.tags.contains(&label)));
        }
        assert!(passages.iter().all(Passage::is_valid));
    }

    #[test]
    fn test_ids_unique_and_formatted() {
        let passages = CorpusBuilder::default().build();
        let ids: HashSet<&str> = passages.iter().map(|p| p.passage_id.as_str()).collect();
        assert_eq!(ids.len(), passages.len());
        assert_eq!(passages[0].passage_id, "credential_stuffing_p01");
        assert_eq!(passages[11].passage_id, "credential_stuffing_p12");
        assert_eq!(passages[0].doc_id, "credential_stuffing_doc");
    }

    #[test]
    fn test_suffix_on_every_second_variant() {
        let passages = CorpusBuilder::new(4, 1).build();
        assert!(passages[0].content.ends_with(VARIANT_SUFFIX));
        assert!(!passages[1].content.ends_with(VARIANT_SUFFIX));
        assert!(passages[2].content.ends_with(VARIANT_SUFFIX));
    }

    #[test]
    fn test_deterministic_for_seed() {
        assert_eq!(CorpusBuilder::new(6, 7).build(), CorpusBuilder::new(6, 7).build());
    }

    #[test]
    fn test_zero_variants_still_one_per_label() {
        let passages = CorpusBuilder::new(0, 1).build();
        assert_eq!(passages.len(), Label::ALL.len());
    }

    #[test]
    fn test_save_and_load_drops_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prepared/corpus_passages.json");
        let mut passages = CorpusBuilder::new(2, 3).build();
        passages[0].content.clear();
        save_passages(&path, &passages).unwrap();

        let loaded = load_passages(&path).unwrap();
        assert_eq!(loaded.len(), passages.len() - 1);
    }
}
