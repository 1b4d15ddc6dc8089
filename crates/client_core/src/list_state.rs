//! Draft/committed filters, pagination and sort for the document list.
//!
//! Draft edits never reach the fingerprint; only `apply_filters` and
//! `clear_filters` move them into the committed set.

use std::cmp::Ordering;

use shared::domain::{Documento, Estado};

use crate::fingerprint::{fingerprint, ListFingerprint, PageSize};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilters {
    pub autor: String,
    pub estado: Option<Estado>,
}

impl ListFilters {
    pub fn is_empty(&self) -> bool {
        self.autor.trim().is_empty() && self.estado.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Titulo,
    Autor,
    Tipo,
    Estado,
    FechaRegistro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub column: SortColumn,
    pub direction: SortDirection,
}

#[derive(Debug, Clone)]
pub struct ListState {
    draft: ListFilters,
    committed: ListFilters,
    page: u32,
    page_size: PageSize,
    sort: Option<SortState>,
    total: Option<u64>,
}

impl Default for ListState {
    fn default() -> Self {
        Self {
            draft: ListFilters::default(),
            committed: ListFilters::default(),
            page: 1,
            page_size: PageSize::default(),
            sort: None,
            total: None,
        }
    }
}

impl ListState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &ListFilters {
        &self.draft
    }

    pub fn committed(&self) -> &ListFilters {
        &self.committed
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn sort(&self) -> Option<SortState> {
        self.sort
    }

    pub fn set_draft_autor(&mut self, autor: impl Into<String>) {
        self.draft.autor = autor.into();
    }

    pub fn set_draft_estado(&mut self, estado: Option<Estado>) {
        self.draft.estado = estado;
    }

    pub fn apply_filters(&mut self) {
        self.committed = ListFilters {
            autor: self.draft.autor.trim().to_string(),
            estado: self.draft.estado,
        };
        self.page = 1;
    }

    pub fn clear_filters(&mut self) {
        self.draft = ListFilters::default();
        self.committed = ListFilters::default();
        self.page = 1;
    }

    pub fn set_page_size(&mut self, page_size: PageSize) {
        self.page_size = page_size;
        self.page = 1;
    }

    /// Records the server-side total of the current query; page bounds follow it.
    pub fn observe_total(&mut self, total: u64) {
        self.total = Some(total);
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn total_pages(&self) -> u32 {
        let size = u64::from(self.page_size.get());
        let pages = self.total.unwrap_or(0).div_ceil(size).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Moves to `page`, clamped to `[1, total_pages]`. Returns the page landed on.
    pub fn set_page(&mut self, page: u32) -> u32 {
        self.page = page.clamp(1, self.total_pages());
        self.page
    }

    pub fn next_page(&mut self) -> u32 {
        self.set_page(self.page.saturating_add(1))
    }

    pub fn prev_page(&mut self) -> u32 {
        self.set_page(self.page.saturating_sub(1))
    }

    pub fn can_go_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn can_go_prev(&self) -> bool {
        self.page > 1
    }

    /// unsorted -> ascending -> descending -> unsorted; another column starts
    /// over at ascending.
    pub fn toggle_sort(&mut self, column: SortColumn) -> Option<SortState> {
        self.sort = match self.sort {
            Some(SortState {
                column: current,
                direction: SortDirection::Ascending,
            }) if current == column => Some(SortState {
                column,
                direction: SortDirection::Descending,
            }),
            Some(SortState {
                column: current,
                direction: SortDirection::Descending,
            }) if current == column => None,
            _ => Some(SortState {
                column,
                direction: SortDirection::Ascending,
            }),
        };
        self.sort
    }

    pub fn fingerprint(&self) -> ListFingerprint {
        fingerprint(
            self.page,
            self.page_size,
            Some(self.committed.autor.as_str()),
            self.committed.estado,
        )
    }

    /// Orders the rows of the visible page by the active sort column.
    pub fn sort_rows(&self, rows: &[Documento]) -> Vec<Documento> {
        let mut rows = rows.to_vec();
        if let Some(sort) = self.sort {
            rows.sort_by(|a, b| {
                let ordering = compare_by(sort.column, a, b);
                match sort.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }
        rows
    }
}

fn compare_by(column: SortColumn, a: &Documento, b: &Documento) -> Ordering {
    match column {
        SortColumn::Id => a.id.cmp(&b.id),
        SortColumn::Titulo => a.titulo.to_lowercase().cmp(&b.titulo.to_lowercase()),
        SortColumn::Autor => a.autor.to_lowercase().cmp(&b.autor.to_lowercase()),
        SortColumn::Tipo => a.tipo.to_lowercase().cmp(&b.tipo.to_lowercase()),
        SortColumn::Estado => a.estado.cmp(&b.estado),
        SortColumn::FechaRegistro => a.fecha_registro.cmp(&b.fecha_registro),
    }
}

#[cfg(test)]
#[path = "tests/list_state_tests.rs"]
mod tests;
