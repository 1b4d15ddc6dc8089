//! Canonical cache keys for registry queries.

use std::{fmt, hash::Hash};

use shared::{
    domain::{DocumentId, Estado},
    protocol::SearchQuery,
};

/// Group of cache keys that a single invalidation can target at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryFamily {
    /// Every page/filter combination of the document list.
    Documentos,
    /// Single documents by id.
    Documento,
}

pub trait QueryKey: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    fn family(&self) -> QueryFamily;
}

impl QueryKey for DocumentId {
    fn family(&self) -> QueryFamily {
        QueryFamily::Documento
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageSize {
    #[default]
    Ten,
    Twenty,
    Fifty,
}

impl PageSize {
    pub const ALL: [PageSize; 3] = [PageSize::Ten, PageSize::Twenty, PageSize::Fifty];

    pub fn get(self) -> u32 {
        match self {
            PageSize::Ten => 10,
            PageSize::Twenty => 20,
            PageSize::Fifty => 50,
        }
    }
}

impl TryFrom<u32> for PageSize {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        PageSize::ALL
            .into_iter()
            .find(|size| size.get() == value)
            .ok_or(value)
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Identity of one list request. Two fingerprints are equal iff every field is
/// equal, so blank author filters are normalized away at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListFingerprint {
    page: u32,
    page_size: PageSize,
    autor: Option<String>,
    estado: Option<Estado>,
}

impl QueryKey for ListFingerprint {
    fn family(&self) -> QueryFamily {
        QueryFamily::Documentos
    }
}

pub fn fingerprint(
    page: u32,
    page_size: PageSize,
    autor: Option<&str>,
    estado: Option<Estado>,
) -> ListFingerprint {
    ListFingerprint {
        page: page.max(1),
        page_size,
        autor: autor
            .map(str::trim)
            .filter(|autor| !autor.is_empty())
            .map(str::to_string),
        estado,
    }
}

impl ListFingerprint {
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn autor(&self) -> Option<&str> {
        self.autor.as_deref()
    }

    pub fn estado(&self) -> Option<Estado> {
        self.estado
    }

    pub fn to_search_query(&self) -> SearchQuery {
        SearchQuery {
            pagina: self.page,
            tam: self.page_size.get(),
            autor: self.autor.clone(),
            estado: self.estado,
        }
    }
}
