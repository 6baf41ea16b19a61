//! Interactive elements and their per-element state machine.
//!
//! Elements are registered with draw commands per state; the base command
//! both paints the element and yields its shape (hit-test predicate plus
//! bounding box). Two input paths drive transitions: discrete pointer
//! events, and the raster touch path with its per-frame debounce counter.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::canvas::Canvas;
use crate::geometry::{DisplayPoint, Rect};

pub type ElementId = u32;

/// Base-state draw command: paints the element and returns its shape.
pub type ShapeDraw = Box<dyn FnMut(&mut dyn Canvas) -> ElementShape>;
/// Hover/active draw command.
pub type StateDraw = Box<dyn FnMut(&mut dyn Canvas)>;
/// Invoked once per confirmed activation.
pub type ActivationFn = Box<dyn FnMut()>;

/// Hit-test predicate plus bounding box, produced by the base draw command.
pub struct ElementShape {
    pub bounds: Rect,
    pub hit_test: Box<dyn Fn(DisplayPoint) -> bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Base,
    Hover,
    /// Sustained raster contact below the hold threshold; drawn as hover.
    Touching(u32),
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Move,
    Down,
    Up,
    /// Touchpad-style tap: press and release collapsed into one event.
    Click,
}

#[derive(Debug, Clone, Copy)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub x: f64,
    pub y: f64,
    pub button: Option<u8>,
}

impl PointerEvent {
    pub fn new(kind: PointerKind, x: f64, y: f64) -> Self {
        Self {
            kind,
            x,
            y,
            button: None,
        }
    }

    pub fn with_button(kind: PointerKind, x: f64, y: f64, button: u8) -> Self {
        Self {
            kind,
            x,
            y,
            button: Some(button),
        }
    }

    fn point(&self) -> DisplayPoint {
        DisplayPoint::new(self.x, self.y)
    }
}

struct Element {
    base: ShapeDraw,
    hover: Option<StateDraw>,
    active: Option<StateDraw>,
    on_activate: Option<ActivationFn>,
    shape: ElementShape,
    state: ElementState,
    touch_frames: u32,
    matrix_claimed: bool,
}

/// Owns all registered elements; the single home of hover/active/touch state.
pub struct ElementRegistry {
    elements: HashMap<ElementId, Element>,
    order: Vec<ElementId>,
    touch_hold_frames: u32,
}

impl ElementRegistry {
    pub fn new(touch_hold_frames: u32) -> Self {
        Self {
            elements: HashMap::new(),
            order: Vec::new(),
            touch_hold_frames,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Element ids in registration order.
    pub fn ids(&self) -> &[ElementId] {
        &self.order
    }

    pub fn state(&self, id: ElementId) -> Option<ElementState> {
        self.elements.get(&id).map(|el| el.state)
    }

    pub fn bounds(&self, id: ElementId) -> Option<Rect> {
        self.elements.get(&id).map(|el| el.shape.bounds)
    }

    pub fn hit_test(&self, id: ElementId, p: DisplayPoint) -> bool {
        self.elements
            .get(&id)
            .map(|el| (el.shape.hit_test)(p))
            .unwrap_or(false)
    }

    /// Ids currently in the hover state (including touching elements,
    /// which are shown as hover).
    pub fn hovering_ids(&self) -> Vec<ElementId> {
        self.ids_where(|el| {
            matches!(el.state, ElementState::Hover | ElementState::Touching(_))
        })
    }

    /// Ids currently in the active state.
    pub fn active_ids(&self) -> Vec<ElementId> {
        self.ids_where(|el| el.state == ElementState::Active)
    }

    /// Ids claimed by the raster path on the most recent frame.
    pub fn matrix_claimed_ids(&self) -> Vec<ElementId> {
        self.ids_where(|el| el.matrix_claimed)
    }

    fn ids_where(&self, predicate: impl Fn(&Element) -> bool) -> Vec<ElementId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.elements.get(id).map(&predicate).unwrap_or(false))
            .collect()
    }

    /// Register an element. The base command runs immediately: drawing the
    /// base state and deriving the shape are the same call.
    pub fn add_element(
        &mut self,
        canvas: &mut dyn Canvas,
        id: ElementId,
        mut base: ShapeDraw,
        hover: Option<StateDraw>,
        active: Option<StateDraw>,
        on_activate: Option<ActivationFn>,
    ) {
        let shape = base(canvas);
        let element = Element {
            base,
            hover,
            active,
            on_activate,
            shape,
            state: ElementState::Base,
            touch_frames: 0,
            matrix_claimed: false,
        };
        if self.elements.insert(id, element).is_some() {
            warn!(id, "replacing an already registered element");
        } else {
            self.order.push(id);
        }
    }

    pub fn set_base(&mut self, canvas: &mut dyn Canvas, id: ElementId) {
        self.set_base_inner(canvas, id, false);
    }

    pub fn set_hover(&mut self, canvas: &mut dyn Canvas, id: ElementId) {
        self.set_hover_inner(canvas, id, false);
    }

    pub fn set_active(&mut self, canvas: &mut dyn Canvas, id: ElementId) {
        self.set_active_inner(canvas, id, false);
    }

    fn set_base_inner(&mut self, canvas: &mut dyn Canvas, id: ElementId, force: bool) {
        let Some(el) = self.elements.get_mut(&id) else {
            return;
        };
        if !force && el.state == ElementState::Base {
            return;
        }
        el.state = ElementState::Base;
        // The base redraw refreshes the stored shape.
        el.shape = (el.base)(canvas);
    }

    fn set_hover_inner(&mut self, canvas: &mut dyn Canvas, id: ElementId, force: bool) {
        let Some(el) = self.elements.get_mut(&id) else {
            return;
        };
        // Hover never downgrades a touching or active element.
        if !force && el.state != ElementState::Base {
            return;
        }
        el.state = ElementState::Hover;
        if let Some(draw) = el.hover.as_mut() {
            draw(canvas);
        }
    }

    fn set_active_inner(&mut self, canvas: &mut dyn Canvas, id: ElementId, force: bool) {
        let Some(el) = self.elements.get_mut(&id) else {
            return;
        };
        if !force && el.state == ElementState::Active {
            return;
        }
        el.state = ElementState::Active;
        if let Some(draw) = el.active.as_mut() {
            draw(canvas);
        }
    }

    /// Invoke the activation callback, if any.
    pub fn trigger_activation(&mut self, id: ElementId) {
        if let Some(el) = self.elements.get_mut(&id) {
            trace!(id, "element activation");
            if let Some(callback) = el.on_activate.as_mut() {
                callback();
            }
        }
    }

    /// Repaint every element in its current state, used after a full
    /// screen repaint.
    pub fn redraw_all(&mut self, canvas: &mut dyn Canvas) {
        for id in self.order.clone() {
            let Some(el) = self.elements.get_mut(&id) else {
                continue;
            };
            match el.state {
                ElementState::Base => {
                    el.shape = (el.base)(canvas);
                }
                ElementState::Hover | ElementState::Touching(_) => {
                    if let Some(draw) = el.hover.as_mut() {
                        draw(canvas);
                    }
                }
                ElementState::Active => {
                    if let Some(draw) = el.active.as_mut() {
                        draw(canvas);
                    }
                }
            }
        }
    }

    /// Drop every hovering element back to base.
    pub fn reset_hovered(&mut self, canvas: &mut dyn Canvas) {
        for id in self.order.clone() {
            if self.state(id) == Some(ElementState::Hover) {
                self.set_base_inner(canvas, id, false);
            }
        }
    }

    /// Release every active element back to base.
    pub fn deactivate_all(&mut self, canvas: &mut dyn Canvas) {
        for id in self.order.clone() {
            if self.state(id) == Some(ElementState::Active) {
                self.set_base_inner(canvas, id, false);
            }
        }
    }

    /// Feed one pointer event through every element's hit test.
    pub fn dispatch_pointer_event(&mut self, canvas: &mut dyn Canvas, event: PointerEvent) {
        let p = event.point();
        for id in self.order.clone() {
            if self.hit_test(id, p) {
                match event.kind {
                    PointerKind::Move => self.set_hover_inner(canvas, id, false),
                    PointerKind::Down => self.set_active_inner(canvas, id, false),
                    PointerKind::Up | PointerKind::Click => {
                        self.trigger_activation(id);
                        self.set_base_inner(canvas, id, false);
                    }
                }
            } else {
                self.set_base_inner(canvas, id, false);
            }
        }
    }

    /// Apply one raster frame's claim set. Claimed elements advance their
    /// debounce counter; everything else resets, and elements claimed on an
    /// earlier frame are forced back to base.
    pub fn apply_touch_frame(&mut self, canvas: &mut dyn Canvas, claimed: &[ElementId]) {
        for id in self.order.clone() {
            if claimed.contains(&id) {
                self.touch_claim(canvas, id);
            } else {
                self.touch_release(canvas, id);
            }
        }
    }

    fn touch_claim(&mut self, canvas: &mut dyn Canvas, id: ElementId) {
        let threshold = self.touch_hold_frames;
        let (frames, state) = {
            let Some(el) = self.elements.get_mut(&id) else {
                return;
            };
            el.matrix_claimed = true;
            el.touch_frames += 1;
            (el.touch_frames, el.state)
        };
        if frames > threshold {
            // Sustained contact confirmed: activate without a release event.
            if state != ElementState::Active {
                self.set_active_inner(canvas, id, false);
                self.trigger_activation(id);
            }
        } else if state != ElementState::Active {
            if let Some(el) = self.elements.get_mut(&id) {
                let needs_draw = matches!(el.state, ElementState::Base | ElementState::Hover);
                el.state = ElementState::Touching(frames);
                if needs_draw {
                    if let Some(draw) = el.hover.as_mut() {
                        draw(canvas);
                    }
                }
            }
        }
    }

    fn touch_release(&mut self, canvas: &mut dyn Canvas, id: ElementId) {
        let was_claimed = {
            let Some(el) = self.elements.get_mut(&id) else {
                return;
            };
            let claimed = el.matrix_claimed;
            el.matrix_claimed = false;
            el.touch_frames = 0;
            claimed
        };
        if was_claimed {
            // Physical contact lifted: whatever the state, back to base.
            self.set_base_inner(canvas, id, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{BufferCanvas, Color};
    use std::cell::Cell;
    use std::rc::Rc;

    fn rect_element(
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        draws: Rc<Cell<u32>>,
    ) -> ShapeDraw {
        Box::new(move |canvas: &mut dyn Canvas| {
            draws.set(draws.get() + 1);
            canvas.fill_rect(x, y, w, h, Color::rgb(0.9, 0.9, 0.9));
            ElementShape {
                bounds: Rect::new(x, y, w, h),
                hit_test: Box::new(move |p: DisplayPoint| {
                    p.x > x && p.x < x + w && p.y > y && p.y < y + h
                }),
            }
        })
    }

    fn counting_draw(count: Rc<Cell<u32>>) -> StateDraw {
        Box::new(move |_canvas: &mut dyn Canvas| {
            count.set(count.get() + 1);
        })
    }

    fn counting_activation(count: Rc<Cell<u32>>) -> ActivationFn {
        Box::new(move || {
            count.set(count.get() + 1);
        })
    }

    struct Fixture {
        canvas: BufferCanvas,
        registry: ElementRegistry,
        base_draws: Rc<Cell<u32>>,
        hover_draws: Rc<Cell<u32>>,
        active_draws: Rc<Cell<u32>>,
        activations: Rc<Cell<u32>>,
    }

    fn fixture(hold_frames: u32) -> Fixture {
        let mut canvas = BufferCanvas::new(100, 100);
        let mut registry = ElementRegistry::new(hold_frames);
        let base_draws = Rc::new(Cell::new(0));
        let hover_draws = Rc::new(Cell::new(0));
        let active_draws = Rc::new(Cell::new(0));
        let activations = Rc::new(Cell::new(0));
        registry.add_element(
            &mut canvas,
            1,
            rect_element(10.0, 10.0, 20.0, 20.0, base_draws.clone()),
            Some(counting_draw(hover_draws.clone())),
            Some(counting_draw(active_draws.clone())),
            Some(counting_activation(activations.clone())),
        );
        Fixture {
            canvas,
            registry,
            base_draws,
            hover_draws,
            active_draws,
            activations,
        }
    }

    #[test]
    fn test_add_element_draws_base_and_derives_shape() {
        let f = fixture(5);
        assert_eq!(f.base_draws.get(), 1);
        assert_eq!(f.registry.state(1), Some(ElementState::Base));
        assert!(f.registry.hit_test(1, DisplayPoint::new(15.0, 15.0)));
        assert!(!f.registry.hit_test(1, DisplayPoint::new(50.0, 50.0)));
        assert_eq!(f.registry.bounds(1), Some(Rect::new(10.0, 10.0, 20.0, 20.0)));
    }

    #[test]
    fn test_transitions_are_idempotent() {
        let mut f = fixture(5);
        f.registry.set_hover(&mut f.canvas, 1);
        f.registry.set_hover(&mut f.canvas, 1);
        assert_eq!(f.hover_draws.get(), 1);

        f.registry.set_active(&mut f.canvas, 1);
        f.registry.set_active(&mut f.canvas, 1);
        assert_eq!(f.active_draws.get(), 1);

        // Hover does not downgrade an active element.
        f.registry.set_hover(&mut f.canvas, 1);
        assert_eq!(f.registry.state(1), Some(ElementState::Active));
        assert_eq!(f.hover_draws.get(), 1);
    }

    #[test]
    fn test_pointer_round_trip_activates_exactly_once() {
        let mut f = fixture(5);
        let inside = |kind| PointerEvent::new(kind, 15.0, 15.0);
        f.registry.dispatch_pointer_event(&mut f.canvas, inside(PointerKind::Move));
        f.registry.dispatch_pointer_event(&mut f.canvas, inside(PointerKind::Move));
        f.registry.dispatch_pointer_event(&mut f.canvas, inside(PointerKind::Down));
        f.registry.dispatch_pointer_event(&mut f.canvas, inside(PointerKind::Move));
        f.registry.dispatch_pointer_event(&mut f.canvas, inside(PointerKind::Up));

        assert_eq!(f.activations.get(), 1);
        assert_eq!(f.registry.state(1), Some(ElementState::Base));
    }

    #[test]
    fn test_pointer_miss_resets_to_base() {
        let mut f = fixture(5);
        f.registry
            .dispatch_pointer_event(&mut f.canvas, PointerEvent::new(PointerKind::Move, 15.0, 15.0));
        assert_eq!(f.registry.state(1), Some(ElementState::Hover));
        f.registry
            .dispatch_pointer_event(&mut f.canvas, PointerEvent::new(PointerKind::Move, 90.0, 90.0));
        assert_eq!(f.registry.state(1), Some(ElementState::Base));
        assert_eq!(f.activations.get(), 0);
    }

    #[test]
    fn test_click_triggers_like_press_and_release() {
        let mut f = fixture(5);
        f.registry.dispatch_pointer_event(
            &mut f.canvas,
            PointerEvent::with_button(PointerKind::Click, 15.0, 15.0, 1),
        );
        assert_eq!(f.activations.get(), 1);
        assert_eq!(f.registry.state(1), Some(ElementState::Base));
    }

    #[test]
    fn test_touch_activates_strictly_after_exceeding_threshold() {
        let mut f = fixture(3);
        for frame in 1..=3 {
            f.registry.apply_touch_frame(&mut f.canvas, &[1]);
            assert_eq!(
                f.registry.state(1),
                Some(ElementState::Touching(frame)),
                "frame {frame} should still be below the hold threshold"
            );
            assert_eq!(f.activations.get(), 0);
        }
        // Fourth consecutive frame exceeds the threshold of 3.
        f.registry.apply_touch_frame(&mut f.canvas, &[1]);
        assert_eq!(f.registry.state(1), Some(ElementState::Active));
        assert_eq!(f.activations.get(), 1);

        // Continued contact does not re-fire.
        f.registry.apply_touch_frame(&mut f.canvas, &[1]);
        assert_eq!(f.activations.get(), 1);
    }

    #[test]
    fn test_touch_counter_resets_on_miss() {
        let mut f = fixture(3);
        f.registry.apply_touch_frame(&mut f.canvas, &[1]);
        f.registry.apply_touch_frame(&mut f.canvas, &[1]);
        assert_eq!(f.registry.state(1), Some(ElementState::Touching(2)));

        // One missed frame resets the counter and releases to base.
        f.registry.apply_touch_frame(&mut f.canvas, &[]);
        assert_eq!(f.registry.state(1), Some(ElementState::Base));

        f.registry.apply_touch_frame(&mut f.canvas, &[1]);
        assert_eq!(f.registry.state(1), Some(ElementState::Touching(1)));
    }

    #[test]
    fn test_sustained_touch_release_returns_active_to_base() {
        let mut f = fixture(2);
        for _ in 0..4 {
            f.registry.apply_touch_frame(&mut f.canvas, &[1]);
        }
        assert_eq!(f.registry.state(1), Some(ElementState::Active));
        assert_eq!(f.activations.get(), 1);

        f.registry.apply_touch_frame(&mut f.canvas, &[]);
        assert_eq!(f.registry.state(1), Some(ElementState::Base));
    }

    #[test]
    fn test_missing_state_callbacks_are_noops() {
        let mut canvas = BufferCanvas::new(50, 50);
        let mut registry = ElementRegistry::new(5);
        let draws = Rc::new(Cell::new(0));
        registry.add_element(
            &mut canvas,
            7,
            rect_element(0.0, 0.0, 10.0, 10.0, draws),
            None,
            None,
            None,
        );
        registry.set_hover(&mut canvas, 7);
        registry.set_active(&mut canvas, 7);
        registry.trigger_activation(7);
        assert_eq!(registry.state(7), Some(ElementState::Active));
    }

    #[test]
    fn test_redraw_all_repaints_current_states() {
        let mut f = fixture(5);
        f.registry.set_hover(&mut f.canvas, 1);
        let hovers_before = f.hover_draws.get();
        f.registry.redraw_all(&mut f.canvas);
        assert_eq!(f.hover_draws.get(), hovers_before + 1);
        // State is unchanged by a repaint.
        assert_eq!(f.registry.state(1), Some(ElementState::Hover));
    }

    #[test]
    fn test_derived_id_sets() {
        let mut f = fixture(3);
        assert!(f.registry.hovering_ids().is_empty());

        f.registry.apply_touch_frame(&mut f.canvas, &[1]);
        assert_eq!(f.registry.hovering_ids(), vec![1]);
        assert_eq!(f.registry.matrix_claimed_ids(), vec![1]);
        assert!(f.registry.active_ids().is_empty());

        for _ in 0..3 {
            f.registry.apply_touch_frame(&mut f.canvas, &[1]);
        }
        assert_eq!(f.registry.active_ids(), vec![1]);
        assert!(f.registry.hovering_ids().is_empty());

        f.registry.apply_touch_frame(&mut f.canvas, &[]);
        assert!(f.registry.matrix_claimed_ids().is_empty());
        assert!(f.registry.active_ids().is_empty());
    }

    #[test]
    fn test_reset_hovered_and_deactivate_all() {
        let mut f = fixture(5);
        f.registry.set_hover(&mut f.canvas, 1);
        f.registry.reset_hovered(&mut f.canvas);
        assert_eq!(f.registry.state(1), Some(ElementState::Base));

        f.registry.set_active(&mut f.canvas, 1);
        f.registry.deactivate_all(&mut f.canvas);
        assert_eq!(f.registry.state(1), Some(ElementState::Base));
    }
}
