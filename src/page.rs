//! # Simulated Page
//!
//! An in-memory frame tree that implements the host and document capability
//! surfaces for every context it contains. Used by the replay binary and by
//! tests; a browser embedding would implement [`FrameHost`] and [`Document`]
//! over the real DOM instead.
//!
//! Element ids are unique across the whole page. Focus moves fire `focusin`
//! synchronously; `Tab` fires `keydown` first and then moves focus to the next
//! tab stop of the same document unless the focused element traps focus.

use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering as AtomicOrdering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use futures::{
    future::{self, join_all, BoxFuture},
    FutureExt,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    dom::{Document, DomEvent, DomEventKind, DomListener, ListenerHandle},
    host::{ContextId, ElementId, FrameElement, FrameHost},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub selector: String,
    #[serde(default)]
    pub html: Option<String>,
    /// `None` or a negative value keeps the element out of the tab order.
    #[serde(default)]
    pub tab_index: Option<i32>,
    /// Pressing Tab while this element is focused leaves focus where it is.
    #[serde(default)]
    pub traps_focus: bool,
}

impl ElementSpec {
    pub fn tabbable(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            html: None,
            tab_index: Some(0),
            traps_focus: false,
        }
    }

    pub fn inert(selector: &str) -> Self {
        Self {
            tab_index: None,
            ..Self::tabbable(selector)
        }
    }

    pub fn with_tab_index(mut self, tab_index: i32) -> Self {
        self.tab_index = Some(tab_index);
        self
    }

    pub fn trapping_focus(mut self) -> Self {
        self.traps_focus = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub selector: String,
    #[serde(default)]
    pub sandbox: Option<String>,
    /// `None` models a frame whose content never loaded.
    #[serde(default)]
    pub document: Option<DocumentSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeSpec {
    Element(ElementSpec),
    Frame(FrameSpec),
}

/// Body content of one document, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSpec {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct SimElement {
    id: ElementId,
    selector: String,
    html: String,
    tab_index: Option<i32>,
    traps_focus: bool,
}

pub struct SimulatedDocument {
    body: ElementId,
    elements: RwLock<Vec<SimElement>>,
    active: RwLock<Option<ElementId>>,
    listeners: Mutex<Vec<(ListenerHandle, DomEventKind, DomListener)>>,
    next_handle: AtomicU64,
    ids: Arc<AtomicU64>,
}

impl SimulatedDocument {
    fn new(ids: Arc<AtomicU64>) -> Self {
        let body = ElementId(ids.fetch_add(1, AtomicOrdering::SeqCst));
        Self {
            body,
            elements: RwLock::new(Vec::new()),
            active: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
            ids,
        }
    }

    pub fn append(&self, spec: &ElementSpec) -> ElementId {
        let id = ElementId(self.ids.fetch_add(1, AtomicOrdering::SeqCst));
        let html = spec
            .html
            .clone()
            .unwrap_or_else(|| format!("<div data-selector=\"{}\"></div>", spec.selector));
        write(&self.elements).push(SimElement {
            id,
            selector: spec.selector.clone(),
            html,
            tab_index: spec.tab_index,
            traps_focus: spec.traps_focus,
        });
        id
    }

    pub fn element_by_selector(&self, selector: &str) -> Option<ElementId> {
        read(&self.elements)
            .iter()
            .find(|element| element.selector == selector)
            .map(|element| element.id)
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Moves focus to `element` and fires `focusin`. The returned future
    /// completes when every listener has finished.
    pub fn focus(&self, element: ElementId) -> BoxFuture<'static, ()> {
        *write(&self.active) = Some(element);
        self.dispatch_event(DomEvent::FocusIn { target: element })
    }

    pub fn blur(&self) {
        *write(&self.active) = None;
    }

    /// Fires `keydown` for `key`. For `Tab` the default action runs right after
    /// the listeners were invoked, as in a browser.
    pub fn press_key(&self, key: &str) -> BoxFuture<'static, ()> {
        let key_down = self.dispatch_event(DomEvent::KeyDown { key: key.to_string() });
        let default_action = if key == "Tab" {
            self.advance_focus()
        } else {
            future::ready(()).boxed()
        };
        async move {
            future::join(key_down, default_action).await;
        }
        .boxed()
    }

    /// Invokes every listener registered for the event's kind.
    pub fn dispatch_event(&self, event: DomEvent) -> BoxFuture<'static, ()> {
        let kind = event.kind();
        let listeners: Vec<DomListener> = lock(&self.listeners)
            .iter()
            .filter(|(_, listener_kind, _)| *listener_kind == kind)
            .map(|(_, _, listener)| listener.clone())
            .collect();
        let completions: Vec<_> = listeners.iter().map(|listener| listener(event.clone())).collect();
        async move {
            join_all(completions).await;
        }
        .boxed()
    }

    fn advance_focus(&self) -> BoxFuture<'static, ()> {
        let current = *read(&self.active);
        let trapped = current
            .and_then(|id| read(&self.elements).iter().find(|e| e.id == id).map(|e| e.traps_focus))
            .unwrap_or(false);
        if trapped {
            debug!("Focus is held by {:?}", current);
            return future::ready(()).boxed();
        }

        let order = self.tabbable_elements();
        let next = match current.and_then(|id| order.iter().position(|e| *e == id)) {
            Some(index) => order.get(index + 1).copied(),
            None => order.first().copied(),
        };
        match next {
            Some(next) => self.focus(next),
            None => {
                self.blur();
                future::ready(()).boxed()
            }
        }
    }

    fn position(&self, element: ElementId) -> usize {
        if element == self.body {
            return 0;
        }
        read(&self.elements)
            .iter()
            .position(|e| e.id == element)
            .map(|index| index + 1)
            .unwrap_or(usize::MAX)
    }
}

impl Document for SimulatedDocument {
    fn body(&self) -> ElementId {
        self.body
    }

    fn active_element(&self) -> Option<ElementId> {
        *read(&self.active)
    }

    fn tabbable_elements(&self) -> Vec<ElementId> {
        let elements = read(&self.elements);
        let mut positive: Vec<&SimElement> = elements
            .iter()
            .filter(|e| matches!(e.tab_index, Some(index) if index > 0))
            .collect();
        // stable, so equal indices keep document order
        positive.sort_by_key(|e| e.tab_index);
        positive
            .into_iter()
            .chain(elements.iter().filter(|e| e.tab_index == Some(0)))
            .map(|e| e.id)
            .collect()
    }

    fn compare_document_position(&self, a: ElementId, b: ElementId) -> Ordering {
        self.position(a).cmp(&self.position(b))
    }

    fn unique_selector(&self, element: ElementId) -> String {
        if element == self.body {
            return "body".to_string();
        }
        read(&self.elements)
            .iter()
            .find(|e| e.id == element)
            .map(|e| e.selector.clone())
            .unwrap_or_else(|| element.to_string())
    }

    fn outer_html(&self, element: ElementId) -> String {
        read(&self.elements)
            .iter()
            .find(|e| e.id == element)
            .map(|e| e.html.clone())
            .unwrap_or_default()
    }

    fn add_event_listener(&self, kind: DomEventKind, listener: DomListener) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, AtomicOrdering::SeqCst));
        lock(&self.listeners).push((handle, kind, listener));
        handle
    }

    fn remove_event_listener(&self, handle: ListenerHandle) {
        lock(&self.listeners).retain(|(h, _, _)| *h != handle);
    }
}

struct FrameSlot {
    frame: FrameElement,
    content: Option<ContextId>,
}

struct ContextNode {
    parent: Option<ContextId>,
    document: Arc<SimulatedDocument>,
    frames: Vec<FrameSlot>,
}

struct PageState {
    top: ContextId,
    contexts: RwLock<HashMap<ContextId, ContextNode>>,
    next_context: AtomicU64,
    ids: Arc<AtomicU64>,
}

#[derive(Clone)]
pub struct SimulatedPage {
    state: Arc<PageState>,
}

impl Default for SimulatedPage {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPage {
    pub fn new() -> Self {
        let ids = Arc::new(AtomicU64::new(1));
        let top = ContextId(1);
        let mut contexts = HashMap::new();
        contexts.insert(
            top,
            ContextNode {
                parent: None,
                document: Arc::new(SimulatedDocument::new(ids.clone())),
                frames: Vec::new(),
            },
        );
        Self {
            state: Arc::new(PageState {
                top,
                contexts: RwLock::new(contexts),
                next_context: AtomicU64::new(2),
                ids,
            }),
        }
    }

    pub fn from_spec(spec: &DocumentSpec) -> Self {
        let page = Self::new();
        page.populate(page.top(), spec);
        page
    }

    fn populate(&self, context: ContextId, spec: &DocumentSpec) {
        for node in &spec.nodes {
            match node {
                NodeSpec::Element(element) => {
                    self.add_element(context, element);
                }
                NodeSpec::Frame(frame) => match &frame.document {
                    Some(document) => {
                        if let Some((_, child)) = self.add_frame(context, &frame.selector, frame.sandbox.as_deref()) {
                            self.populate(child, document);
                        }
                    }
                    None => {
                        self.add_dead_frame(context, &frame.selector);
                    }
                },
            }
        }
    }

    pub fn top(&self) -> ContextId {
        self.state.top
    }

    /// All live contexts, top first.
    pub fn contexts(&self) -> Vec<ContextId> {
        let mut contexts: Vec<ContextId> = read(&self.state.contexts).keys().copied().collect();
        contexts.sort();
        contexts
    }

    pub fn document(&self, context: ContextId) -> Option<Arc<SimulatedDocument>> {
        read(&self.state.contexts).get(&context).map(|node| node.document.clone())
    }

    pub fn host(&self, context: ContextId) -> Arc<dyn FrameHost> {
        Arc::new(PageHost {
            state: self.state.clone(),
            context,
        })
    }

    pub fn add_element(&self, context: ContextId, spec: &ElementSpec) -> Option<ElementId> {
        self.document(context).map(|document| document.append(spec))
    }

    /// Adds a frame element with a live content context and returns both.
    pub fn add_frame(
        &self,
        parent: ContextId,
        selector: &str,
        sandbox: Option<&str>,
    ) -> Option<(ElementId, ContextId)> {
        let element = self.attach_frame_element(parent, selector, sandbox)?;
        let child = ContextId(self.state.next_context.fetch_add(1, AtomicOrdering::SeqCst));
        let mut contexts = write(&self.state.contexts);
        contexts.insert(
            child,
            ContextNode {
                parent: Some(parent),
                document: Arc::new(SimulatedDocument::new(self.state.ids.clone())),
                frames: Vec::new(),
            },
        );
        if let Some(slot) = contexts
            .get_mut(&parent)
            .and_then(|node| node.frames.iter_mut().find(|slot| slot.frame.element == element))
        {
            slot.content = Some(child);
        }
        Some((element, child))
    }

    /// Adds a frame element without any content context.
    pub fn add_dead_frame(&self, parent: ContextId, selector: &str) -> Option<ElementId> {
        self.attach_frame_element(parent, selector, None)
    }

    fn attach_frame_element(&self, parent: ContextId, selector: &str, sandbox: Option<&str>) -> Option<ElementId> {
        let document = self.document(parent)?;
        let element = document.append(&ElementSpec {
            html: Some(format!("<iframe data-selector=\"{}\"></iframe>", selector)),
            ..ElementSpec::inert(selector)
        });
        let frame = match sandbox {
            Some(tokens) => FrameElement::sandboxed(element, tokens),
            None => FrameElement::new(element),
        };
        let mut contexts = write(&self.state.contexts);
        let node = contexts.get_mut(&parent)?;
        node.frames.push(FrameSlot { frame, content: None });
        Some(element)
    }

    /// Follows frame selectors from the top context.
    pub fn resolve(&self, frame_path: &[String]) -> Option<ContextId> {
        let contexts = read(&self.state.contexts);
        let mut current = self.state.top;
        for selector in frame_path {
            let node = contexts.get(&current)?;
            let element = node.document.element_by_selector(selector)?;
            current = node
                .frames
                .iter()
                .find(|slot| slot.frame.element == element)
                .and_then(|slot| slot.content)?;
        }
        Some(current)
    }
}

struct PageHost {
    state: Arc<PageState>,
    context: ContextId,
}

impl FrameHost for PageHost {
    fn current_context(&self) -> ContextId {
        self.context
    }

    fn is_top_context(&self) -> bool {
        self.context == self.state.top
    }

    fn parent_context(&self) -> Option<ContextId> {
        read(&self.state.contexts)
            .get(&self.context)
            .and_then(|node| node.parent)
    }

    fn child_frames(&self) -> Vec<FrameElement> {
        read(&self.state.contexts)
            .get(&self.context)
            .map(|node| node.frames.iter().map(|slot| slot.frame.clone()).collect())
            .unwrap_or_default()
    }

    fn content_context(&self, frame: &FrameElement) -> Option<ContextId> {
        read(&self.state.contexts)
            .get(&self.context)?
            .frames
            .iter()
            .find(|slot| slot.frame.element == frame.element)
            .and_then(|slot| slot.content)
    }

    fn frame_for_context(&self, context: ContextId) -> Option<FrameElement> {
        read(&self.state.contexts)
            .get(&self.context)?
            .frames
            .iter()
            .find(|slot| slot.content == Some(context))
            .map(|slot| slot.frame.clone())
    }
}
