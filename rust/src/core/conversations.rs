//! Conversation list store: four independently paginated tabs.

use crate::state::{ConversationPatch, ConversationSummary, ConversationTab, TabState};
use crate::transport::{ListQuery, Page, TransportError};

use super::config::PageSizes;

/// Who asked for a fetch decides how its failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchOrigin {
    User,
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TabRequest {
    pub(crate) tab: ConversationTab,
    pub(crate) generation: u64,
    pub(crate) append: bool,
    pub(crate) origin: FetchOrigin,
    pub(crate) query: ListQuery,
}

#[derive(Debug)]
pub(crate) enum TabOutcome {
    Stale,
    Failed(TransportError),
    Applied { count: usize },
}

#[derive(Debug, Clone)]
struct TabSlot {
    items: Vec<ConversationSummary>,
    cursor: Option<String>,
    has_more: bool,
    // Bumped by every replacing load, so older replaces and appends that
    // were paging the previous set can be recognised as stale.
    generation: u64,
}

impl Default for TabSlot {
    fn default() -> Self {
        Self {
            items: vec![],
            cursor: None,
            has_more: true,
            generation: 0,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ConversationLists {
    slots: [TabSlot; 4],
    current_tab: ConversationTab,
    loading_more: bool,
    sizes: PageSizes,
}

impl ConversationLists {
    pub(crate) fn new(sizes: PageSizes) -> Self {
        Self {
            slots: Default::default(),
            current_tab: ConversationTab::Bot,
            loading_more: false,
            sizes,
        }
    }

    fn slot(&self, tab: ConversationTab) -> &TabSlot {
        &self.slots[tab.index()]
    }

    fn slot_mut(&mut self, tab: ConversationTab) -> &mut TabSlot {
        &mut self.slots[tab.index()]
    }

    pub(crate) fn current_tab(&self) -> ConversationTab {
        self.current_tab
    }

    /// Returns true when the tab actually changed.
    pub(crate) fn select_tab(&mut self, tab: ConversationTab) -> bool {
        if self.current_tab == tab {
            return false;
        }
        self.current_tab = tab;
        true
    }

    pub(crate) fn is_loading_more(&self) -> bool {
        self.loading_more
    }

    pub(crate) fn items(&self, tab: ConversationTab) -> &[ConversationSummary] {
        &self.slot(tab).items
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &ConversationSummary> {
        self.slots.iter().flat_map(|s| s.items.iter())
    }

    fn page_size(&self, tab: ConversationTab) -> u32 {
        match tab {
            ConversationTab::Resolved => self.sizes.resolved,
            _ => self.sizes.tab,
        }
    }

    /// `append=false` starts a replacing load; `append=true` continues from
    /// the held cursor and is `None` when there is none.
    pub(crate) fn begin_load(
        &mut self,
        tab: ConversationTab,
        append: bool,
        origin: FetchOrigin,
    ) -> Option<TabRequest> {
        let limit = self.page_size(tab);
        let slot = self.slot_mut(tab);
        let cursor = if append {
            Some(slot.cursor.clone()?)
        } else {
            slot.generation += 1;
            None
        };
        Some(TabRequest {
            tab,
            generation: slot.generation,
            append,
            origin,
            query: ListQuery {
                status: tab.status_filter().to_string(),
                limit,
                cursor,
                mine: tab.mine_only(),
            },
        })
    }

    /// Guarded by the shared loading flag and the active tab's `has_more`.
    pub(crate) fn begin_load_more_current(&mut self) -> Option<TabRequest> {
        if self.loading_more || !self.slot(self.current_tab).has_more {
            return None;
        }
        let req = self.begin_load(self.current_tab, true, FetchOrigin::User)?;
        self.loading_more = true;
        Some(req)
    }

    /// Bot, pending and claimed always; resolved only while it is the
    /// active tab.
    pub(crate) fn begin_refresh_all(&mut self, origin: FetchOrigin) -> Vec<TabRequest> {
        let mut tabs = vec![
            ConversationTab::Bot,
            ConversationTab::Pending,
            ConversationTab::Claimed,
        ];
        if self.current_tab == ConversationTab::Resolved {
            tabs.push(ConversationTab::Resolved);
        }
        tabs.into_iter()
            .filter_map(|tab| self.begin_load(tab, false, origin))
            .collect()
    }

    pub(crate) fn apply(
        &mut self,
        req: &TabRequest,
        result: Result<Page<ConversationSummary>, TransportError>,
    ) -> TabOutcome {
        if req.append {
            self.loading_more = false;
        }
        let slot = self.slot_mut(req.tab);
        if slot.generation != req.generation {
            return TabOutcome::Stale;
        }
        let page = match result {
            Ok(page) => page,
            Err(e) => return TabOutcome::Failed(e),
        };
        let cursor = page.cursor();
        let count = page.items.len();
        if req.append {
            slot.items.extend(page.items);
        } else {
            slot.items = page.items;
            slot.generation += 1;
        }
        slot.has_more = cursor.is_some();
        slot.cursor = cursor;
        TabOutcome::Applied { count }
    }

    /// Patch every row with this id, in every tab. Returns how many rows
    /// changed.
    pub(crate) fn patch(&mut self, conversation_id: &str, patch: &ConversationPatch) -> usize {
        let mut patched = 0;
        for row in self
            .slots
            .iter_mut()
            .flat_map(|s| s.items.iter_mut())
            .filter(|c| c.conversation_id == conversation_id)
        {
            row.apply_patch(patch);
            patched += 1;
        }
        patched
    }

    pub(crate) fn tab_states(&self) -> Vec<TabState> {
        ConversationTab::ALL
            .iter()
            .map(|tab| {
                let slot = self.slot(*tab);
                TabState {
                    tab: *tab,
                    items: slot.items.clone(),
                    cursor: slot.cursor.clone(),
                    has_more: slot.has_more,
                }
            })
            .collect()
    }
}
