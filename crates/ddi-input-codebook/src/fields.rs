//! Field extraction from a `codeBook` tree. Pure reads, no catalog access.

use std::collections::HashSet;

use ddi_core::document::{first_non_empty, Element, Node};

/// The study identifier and the agency that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyId {
    pub value: String,
    pub agency: Option<String>,
}

impl StudyId {
    /// Agency followed by identifier, e.g. `FSDFSD1234`.
    pub fn qualified(&self) -> String {
        format!("{}{}", self.agency.as_deref().unwrap_or_default(), self.value)
    }
}

/// One `AuthEnty` with its affiliation (empty when absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub organization: String,
}

/// A parallel title and its language (both empty when absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelTitle {
    pub title: String,
    pub lang: String,
}

/// Read access to the sections of a codebook that feed a catalog record.
pub struct Codebook<'a> {
    root: &'a Element,
    study: Option<&'a Element>,
    study_citation: Option<&'a Element>,
    doc_citation: Option<&'a Element>,
}

impl<'a> Codebook<'a> {
    pub fn new(root: &'a Element) -> Self {
        let study = root.find("stdyDscr");
        Self {
            root,
            study,
            study_citation: study.and_then(|s| s.find("citation")),
            doc_citation: root.find_path(&["docDscr", "citation"]),
        }
    }

    fn study_path(&self, path: &[&str]) -> Option<&'a Element> {
        self.study_citation.and_then(|c| c.find_path(path))
    }

    fn study_all(&self, section: &str, name: &'a str) -> Vec<&'a Element> {
        self.study_path(&[section])
            .map(|s| s.find_all(name).collect())
            .unwrap_or_default()
    }

    pub fn language(&self) -> Option<&'a str> {
        self.root.non_empty_attr("xml:lang")
    }

    /// Study title, else the document description's title.
    pub fn title(&self) -> Option<&'a str> {
        first_non_empty([
            self.study_path(&["titlStmt", "titl"]).and_then(Element::string),
            self.doc_citation
                .and_then(|c| c.find_path(&["titlStmt", "titl"]))
                .and_then(Element::string),
        ])
    }

    /// Study `IDNo`, else the document description's `IDNo`.
    pub fn study_id(&self) -> Option<StudyId> {
        let candidates = [
            self.study_path(&["titlStmt", "IDNo"]),
            self.doc_citation.and_then(|c| c.find_path(&["titlStmt", "IDNo"])),
        ];
        candidates.into_iter().flatten().find_map(|el| {
            let value = el.trimmed_string()?;
            Some(StudyId {
                value: value.to_string(),
                agency: el.non_empty_attr("agency").map(str::to_string),
            })
        })
    }

    /// First of producer, author entity, other contributor with text.
    pub fn responsible_party(&self) -> Option<&'a str> {
        first_non_empty([
            self.study_path(&["prodStmt", "producer"]).and_then(Element::string),
            self.study_path(&["rspStmt", "AuthEnty"]).and_then(Element::string),
            self.study_path(&["rspStmt", "othId"]).and_then(Element::string),
        ])
    }

    /// Distribution contact name and its `email` attribute.
    pub fn contact(&self) -> Option<(Option<&'a str>, Option<&'a str>)> {
        let contact = self.study_path(&["distStmt", "contact"])?;
        Some((contact.trimmed_string(), contact.non_empty_attr("email")))
    }

    /// Raw keyword texts under `stdyInfo/subject`, in document order.
    pub fn keywords(&self) -> Vec<&'a str> {
        let Some(subject) = self.study.and_then(|s| s.find_path(&["stdyInfo", "subject"])) else {
            return Vec::new();
        };
        subject
            .find_all_matching(|el| matches!(el.name(), "keyword" | "topcClas"))
            .filter_map(Element::string)
            .collect()
    }

    /// Abstract paragraphs joined with `<br />`, else series information.
    pub fn description(&self) -> Option<String> {
        let abstracts: Vec<&Element> = self
            .study
            .and_then(|s| s.find("stdyInfo"))
            .map(|info| info.children_named("abstract").collect())
            .unwrap_or_default();

        let parts: Vec<String> = if abstracts.is_empty() {
            self.study_path(&["serStmt", "serInfo"])
                .map(paragraphs)
                .unwrap_or_default()
        } else {
            abstracts
                .into_iter()
                .flat_map(|abs| {
                    let paras = paragraphs(abs);
                    if paras.is_empty() {
                        vec![abs.text().trim().to_string()]
                    } else {
                        paras
                    }
                })
                .collect()
        };

        let parts: Vec<String> = parts.into_iter().filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("<br />"))
        }
    }

    /// `URI` attribute of the document description's holdings.
    pub fn holdings_uri(&self) -> Option<&'a str> {
        self.doc_citation?.find("holdings")?.non_empty_attr("URI")
    }

    /// One representative text per distinct element name across the
    /// document citation and the study description. Paragraphs count under
    /// their parent's name. Only elements holding their own text run
    /// contribute, so a wrapper never repeats its single child's value.
    pub fn search_corpus(&self) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut corpus = Vec::new();
        let sections = [self.doc_citation, self.study].into_iter().flatten();

        for section in sections {
            for (parent, el) in section.descendants().with_parent() {
                let effective = if el.name() == "p" { parent.name() } else { el.name() };
                if seen.contains(effective) || !matches!(el.children(), [Node::Text(_)]) {
                    continue;
                }
                if let Some(text) = el.trimmed_string() {
                    seen.insert(effective);
                    corpus.push(text.to_string());
                }
            }
        }
        corpus
    }

    pub fn distributor(&self) -> Option<&'a str> {
        self.study_path(&["distStmt", "distrbtr"])?.trimmed_string()
    }

    pub fn production_date(&self) -> Option<&'a str> {
        self.study_path(&["prodStmt", "prodDate"])?.non_empty_attr("date")
    }

    pub fn parallel_titles(&self) -> Vec<ParallelTitle> {
        self.study_all("titlStmt", "parTitl")
            .into_iter()
            .map(|el| ParallelTitle {
                title: el.string().unwrap_or_default().to_string(),
                lang: el.attr("xml:lang").unwrap_or_default().to_string(),
            })
            .collect()
    }

    pub fn authors(&self) -> Vec<Author> {
        self.study_all("rspStmt", "AuthEnty")
            .into_iter()
            .map(|el| Author {
                name: el.string().unwrap_or_default().to_string(),
                organization: el.attr("affiliation").unwrap_or_default().to_string(),
            })
            .collect()
    }

    /// Text of the last `othId`.
    pub fn contributor(&self) -> Option<&'a str> {
        self.study_all("rspStmt", "othId")
            .last()
            .copied()
            .and_then(Element::string)
    }

    /// Text of the last `producer`.
    pub fn last_producer(&self) -> Option<&'a str> {
        self.study_all("prodStmt", "producer")
            .last()
            .copied()
            .and_then(Element::string)
    }

    /// Every producer with text, in document order, each name once.
    pub fn producer_names(&self) -> Vec<&'a str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self
            .study_all("prodStmt", "producer")
            .into_iter()
            .filter_map(Element::trimmed_string)
        {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn data_description(&self) -> Option<&'a Element> {
        self.root.child("dataDscr")
    }
}

fn paragraphs(el: &Element) -> Vec<String> {
    el.find_all("p")
        .map(|p| match p.string() {
            Some(s) => s.trim().to_string(),
            None => p.text().trim().to_string(),
        })
        .collect()
}
