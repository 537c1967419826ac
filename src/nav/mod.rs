//! Navigation between symbolicated and raw views of the live process.
//!
//! Addresses backed by the loaded static image are forwarded to the host symbolic view,
//! everything else is decoded from live memory by the raw renderer.

pub mod history;
pub mod state;

use crate::address::LiveAddress;
use crate::disasm::render::{DisassemblyLine, Renderer};
use crate::disasm::Arch;
use crate::image::{Function, StaticImage};
use crate::ld_debug;
use crate::nav::history::{HistoryEntry, HistoryPayload, NavigationHistory};
use crate::nav::state::{Mode, NavState, SymbolContext};
use crate::session::DebugState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host view that displays code of the static image.
pub trait SymbolicView {
    /// Show static address `addr`. Return `false` if the view rejects it.
    fn navigate(&mut self, addr: u64) -> bool;

    fn current_offset(&self) -> u64;

    fn selection(&self) -> (u64, u64) {
        let offset = self.current_offset();
        (offset, offset)
    }
}

/// Host hex view of the live process memory.
pub trait MemoryPane {
    fn navigate(&mut self, addr: u64);

    fn current_offset(&self) -> u64;
}

/// Pending refresh request. Any number of requests collapse into a single refresh.
#[derive(Clone, Default, Debug)]
pub struct RefreshTrigger(Arc<AtomicBool>);

impl RefreshTrigger {
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume pending request.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

pub struct NavigationController {
    image: Box<dyn StaticImage>,
    renderer: Renderer,
    symbolic: Box<dyn SymbolicView>,
    memory_pane: Box<dyn MemoryPane>,
    state: NavState,
    replaying: bool,
    raw_lines: Vec<DisassemblyLine>,
    instruction_count: usize,
    memory_history_addr: u64,
    history: NavigationHistory,
    refresh: RefreshTrigger,
}

impl NavigationController {
    pub fn new(
        image: Box<dyn StaticImage>,
        renderer: Renderer,
        symbolic: Box<dyn SymbolicView>,
        memory_pane: Box<dyn MemoryPane>,
    ) -> Self {
        let arch = renderer.decoder().arch();
        let address = symbolic.current_offset();
        let function = image.function_containing(address).cloned();
        Self {
            image,
            renderer,
            symbolic,
            memory_pane,
            state: NavState::Symbolicated(SymbolContext {
                address,
                function,
                arch,
            }),
            replaying: false,
            raw_lines: vec![],
            instruction_count: 50,
            memory_history_addr: 0,
            history: NavigationHistory::default(),
            // first tick always refreshes
            refresh: {
                let trigger = RefreshTrigger::default();
                trigger.request();
                trigger
            },
        }
    }

    /// Set number of instructions in a raw listing.
    pub fn with_instruction_count(mut self, count: usize) -> Self {
        self.instruction_count = count;
        self
    }

    /// User navigation to live address `addr`, current position goes to history.
    pub fn navigate(&mut self, state: &mut dyn DebugState, addr: u64) -> bool {
        let entry = self.capture_history_entry(&*state);
        self.history.record(entry);
        self.navigate_to(state, addr)
    }

    fn navigate_to(&mut self, state: &mut dyn DebugState, addr: u64) -> bool {
        let memory = state.memory();
        if memory.is_local_addr(addr) {
            let local = memory.remote_addr_to_local(addr);
            if self.image.contains_bytes(local) && self.image.function_containing(local).is_some()
            {
                return self.navigate_live(local);
            }
        }
        self.navigate_raw(state, addr)
    }

    /// Show static address `addr` in the symbolic view.
    pub fn navigate_live(&mut self, addr: u64) -> bool {
        self.state = NavState::Symbolicated(SymbolContext {
            address: addr,
            function: self.image.function_containing(addr).cloned(),
            arch: self.renderer.decoder().arch(),
        });
        self.symbolic.navigate(addr)
    }

    /// Render raw listing at live address `addr`.
    pub fn navigate_raw(&mut self, state: &mut dyn DebugState, addr: u64) -> bool {
        self.state = NavState::Raw { address: addr };
        self.raw_lines = self.renderer.render(state, addr, self.instruction_count);
        true
    }

    pub fn navigate_memory(&mut self, addr: u64) {
        self.memory_pane.navigate(addr);
    }

    /// Snapshot current position. Return [`None`] while a history entry is replayed.
    pub fn capture_history_entry(&mut self, state: &dyn DebugState) -> Option<HistoryEntry> {
        if self.replaying {
            return None;
        }
        let memory_address = self.memory_pane.current_offset();
        self.memory_history_addr = memory_address;

        let payload = match self.state {
            // module bases are meaningless without a live process
            NavState::Raw { address } if state.is_connected() => {
                let modules = state.modules();
                modules
                    .module_for_address(address)
                    .and_then(|module| {
                        LiveAddress::from(address).relative_to(module, modules.load_base(module)?)
                    })
                    .map(HistoryPayload::Raw)
                    .unwrap_or(HistoryPayload::Live(address))
            }
            _ => HistoryPayload::Code(self.symbolic.current_offset()),
        };

        Some(HistoryEntry {
            memory_address,
            payload,
        })
    }

    /// Restore position from `entry`, without recording new history.
    pub fn replay_history_entry(&mut self, state: &mut dyn DebugState, entry: &HistoryEntry) -> bool {
        self.replaying = true;
        let result = self.replay(state, entry);
        self.replaying = false;
        result
    }

    fn replay(&mut self, state: &mut dyn DebugState, entry: &HistoryEntry) -> bool {
        self.memory_pane.navigate(entry.memory_address);
        match &entry.payload {
            HistoryPayload::Code(addr) => self.navigate_live(*addr),
            HistoryPayload::Raw(offset) => {
                if !state.is_connected() {
                    ld_debug!("not connected, skip raw history entry {offset}");
                    return false;
                }
                match state.modules().load_base(&offset.module) {
                    Some(base) => self.navigate_raw(state, offset.relocate(base).as_u64()),
                    None => {
                        ld_debug!("module {} is not loaded, skip history entry", offset.module);
                        false
                    }
                }
            }
            HistoryPayload::Live(addr) => {
                if !state.is_connected() {
                    ld_debug!("not connected, skip raw history entry {addr:#x}");
                    return false;
                }
                self.navigate_raw(state, *addr)
            }
        }
    }

    /// Go to previous position. Return `false` if there is none.
    pub fn back(&mut self, state: &mut dyn DebugState) -> bool {
        let Some(entry) = self.history.pop_back() else {
            return false;
        };
        if let Some(current) = self.capture_history_entry(&*state) {
            self.history.push_forward(current);
        }
        self.replay_history_entry(state, &entry);
        true
    }

    /// Go to the position left by [`NavigationController::back`].
    pub fn forward(&mut self, state: &mut dyn DebugState) -> bool {
        let Some(entry) = self.history.pop_forward() else {
            return false;
        };
        if let Some(current) = self.capture_history_entry(&*state) {
            self.history.push_back(current);
        }
        self.replay_history_entry(state, &entry);
        true
    }

    /// Debugee memory may have changed, refresh on the next tick.
    pub fn notify_memory_changed(&self) {
        self.refresh.request();
    }

    /// Handle for requesting a refresh from other threads.
    pub fn refresh_trigger(&self) -> RefreshTrigger {
        self.refresh.clone()
    }

    /// Periodic update. Return `true` if a pending refresh was handled.
    pub fn on_timer_tick(&mut self, state: &dyn DebugState) -> bool {
        if !self.refresh.take() {
            return false;
        }
        if !state.is_connected() {
            self.memory_pane.navigate(0);
        }
        true
    }

    pub fn mode(&self) -> Mode {
        self.state.mode()
    }

    pub fn nav_state(&self) -> &NavState {
        &self.state
    }

    pub fn current_offset(&self) -> u64 {
        match self.state {
            NavState::Symbolicated(_) => self.symbolic.current_offset(),
            NavState::Raw { address } => address,
        }
    }

    pub fn selection(&self) -> (u64, u64) {
        match self.state {
            NavState::Symbolicated(_) => self.symbolic.selection(),
            NavState::Raw { address } => (address, address),
        }
    }

    pub fn current_function(&self) -> Option<&Function> {
        self.state.symbol_context()?.function.as_ref()
    }

    pub fn current_arch(&self) -> Option<Arch> {
        self.state.symbol_context().map(|ctx| ctx.arch)
    }

    /// Last raw listing, empty until the first raw navigation.
    pub fn raw_lines(&self) -> &[DisassemblyLine] {
        &self.raw_lines
    }

    pub fn memory_history_addr(&self) -> u64 {
        self.memory_history_addr
    }

    pub fn history(&self) -> &NavigationHistory {
        &self.history
    }
}

#[cfg(test)]
mod test {
    use super::{MemoryPane, NavigationController, SymbolicView};
    use crate::disasm::decoder::Decoder;
    use crate::disasm::render::{LineKind, Renderer};
    use crate::disasm::{Arch, Syntax};
    use crate::error::Error;
    use crate::image::{Function, ObjectImage};
    use crate::nav::history::{HistoryEntry, HistoryPayload};
    use crate::nav::state::Mode;
    use crate::session::breakpoints::{BreakpointLookup, BreakpointSet};
    use crate::session::modules::{ModuleMap, ModuleTable};
    use crate::session::{DebugState, MemoryView};
    use std::cell::Cell;
    use std::rc::Rc;

    struct FakeMemory {
        live_base: u64,
        static_base: u64,
        size: u64,
    }

    impl MemoryView for FakeMemory {
        fn read(&mut self, _addr: u64, len: usize) -> Result<Vec<u8>, Error> {
            Ok(vec![0x90; len])
        }

        fn is_local_addr(&self, addr: u64) -> bool {
            addr >= self.live_base && addr < self.live_base + self.size
        }

        fn remote_addr_to_local(&self, addr: u64) -> u64 {
            addr - self.live_base + self.static_base
        }
    }

    struct FakeState {
        connected: bool,
        memory: FakeMemory,
        breakpoints: BreakpointSet,
        modules: ModuleMap,
    }

    impl FakeState {
        fn new() -> Self {
            let mut modules = ModuleMap::default();
            modules.insert("/bin/app", 0x5000_0000, 0x5000_3000);
            modules.insert("M", 0x1000, 0x1800);
            Self {
                connected: true,
                memory: FakeMemory {
                    live_base: 0x5000_0000,
                    static_base: 0x400000,
                    size: 0x3000,
                },
                breakpoints: BreakpointSet::default(),
                modules,
            }
        }
    }

    impl DebugState for FakeState {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn ip(&mut self) -> Option<u64> {
            None
        }

        fn memory(&mut self) -> &mut dyn MemoryView {
            &mut self.memory
        }

        fn breakpoints(&self) -> &dyn BreakpointLookup {
            &self.breakpoints
        }

        fn modules(&self) -> &dyn ModuleTable {
            &self.modules
        }
    }

    struct View(Rc<Cell<u64>>);

    impl SymbolicView for View {
        fn navigate(&mut self, addr: u64) -> bool {
            self.0.set(addr);
            true
        }

        fn current_offset(&self) -> u64 {
            self.0.get()
        }
    }

    impl MemoryPane for View {
        fn navigate(&mut self, addr: u64) {
            self.0.set(addr);
        }

        fn current_offset(&self) -> u64 {
            self.0.get()
        }
    }

    struct Fixture {
        controller: NavigationController,
        symbolic: Rc<Cell<u64>>,
        memory_pane: Rc<Cell<u64>>,
    }

    fn fixture() -> Fixture {
        // file bytes at 0x401000..0x402000, main lives at 0x401100..0x401180
        let image = ObjectImage::new(
            "/bin/app",
            0x400000,
            0x3000,
            vec![0x401000..0x402000],
            vec![Function {
                name: "main".to_string(),
                start: 0x401100,
                end: 0x401180,
            }],
        );
        let renderer = Renderer::new(Decoder::new(Arch::X86_64, Syntax::Intel).unwrap());
        let symbolic = Rc::new(Cell::new(0x401100));
        let memory_pane = Rc::new(Cell::new(0x7fff_0000));
        let controller = NavigationController::new(
            Box::new(image),
            renderer,
            Box::new(View(symbolic.clone())),
            Box::new(View(memory_pane.clone())),
        )
        .with_instruction_count(8);

        Fixture {
            controller,
            symbolic,
            memory_pane,
        }
    }

    #[test]
    fn test_mode_selection() {
        struct TestCase {
            addr: u64,
            mode: Mode,
        }

        let cases = [
            // inside main
            TestCase {
                addr: 0x5000_1110,
                mode: Mode::Symbolicated,
            },
            // file backed, no function
            TestCase {
                addr: 0x5000_1500,
                mode: Mode::Raw,
            },
            // mapped by the image but not file backed
            TestCase {
                addr: 0x5000_2100,
                mode: Mode::Raw,
            },
            // outside the image
            TestCase {
                addr: 0x1040,
                mode: Mode::Raw,
            },
        ];

        let mut state = FakeState::new();
        for tc in cases {
            let mut f = fixture();
            assert!(f.controller.navigate(&mut state, tc.addr));
            assert_eq!(f.controller.mode(), tc.mode, "{:#x}", tc.addr);

            match tc.mode {
                Mode::Symbolicated => {
                    assert_eq!(f.symbolic.get(), tc.addr - 0x5000_0000 + 0x400000);
                    assert_eq!(f.controller.current_function().unwrap().name, "main");
                    assert_eq!(f.controller.current_arch(), Some(Arch::X86_64));
                }
                Mode::Raw => {
                    assert_eq!(f.controller.current_offset(), tc.addr);
                    assert_eq!(f.controller.selection(), (tc.addr, tc.addr));
                    assert!(f.controller.current_function().is_none());
                    let lines = f.controller.raw_lines();
                    assert_eq!(lines.len(), 9);
                    assert_eq!(lines[0].kind, LineKind::Banner);
                    assert_eq!(lines[1].address, Some(tc.addr));
                }
            }
        }
    }

    #[test]
    fn test_replay_does_not_record() {
        let mut f = fixture();
        let mut state = FakeState::new();
        f.controller.navigate(&mut state, 0x1040);
        assert_eq!(f.controller.history().back_len(), 1);

        let entry = HistoryEntry {
            memory_address: 0x10,
            payload: HistoryPayload::Code(0x401100),
        };
        assert!(f.controller.replay_history_entry(&mut state, &entry));
        assert_eq!(f.controller.history().back_len(), 1);
        assert_eq!(f.controller.mode(), Mode::Symbolicated);
        assert_eq!(f.memory_pane.get(), 0x10);

        // flag is cleared after replay
        assert!(f.controller.capture_history_entry(&state).is_some());
    }

    #[test]
    fn test_code_entry_round_trip() {
        let mut f = fixture();
        let mut state = FakeState::new();

        f.controller.navigate_live(0x401120);
        let entry = f.controller.capture_history_entry(&state).unwrap();
        assert_eq!(entry.payload, HistoryPayload::Code(0x401120));
        assert_eq!(entry.memory_address, 0x7fff_0000);
        assert_eq!(f.controller.memory_history_addr(), 0x7fff_0000);

        f.controller.navigate(&mut state, 0x1040);
        f.controller.navigate_memory(0x1234);
        assert_eq!(f.controller.mode(), Mode::Raw);

        f.controller.replay_history_entry(&mut state, &entry);
        assert_eq!(f.controller.mode(), Mode::Symbolicated);
        assert_eq!(f.symbolic.get(), 0x401120);
        assert_eq!(f.memory_pane.get(), 0x7fff_0000);
    }

    #[test]
    fn test_raw_entry_survives_rebase() {
        let mut f = fixture();
        let mut state = FakeState::new();

        f.controller.navigate(&mut state, 0x1040);
        let entry = f.controller.capture_history_entry(&state).unwrap();
        match &entry.payload {
            HistoryPayload::Raw(offset) => {
                assert_eq!(offset.module, "M");
                assert_eq!(offset.offset, 0x40);
            }
            other => panic!("unexpected payload {other:?}"),
        }

        // debugee restarted, module loaded at another base
        state.modules = ModuleMap::default();
        state.modules.insert("M", 0x2000, 0x2800);

        assert!(f.controller.replay_history_entry(&mut state, &entry));
        assert_eq!(f.controller.mode(), Mode::Raw);
        assert_eq!(f.controller.current_offset(), 0x2040);

        // module is gone, replay of the raw half is skipped
        state.modules = ModuleMap::default();
        f.controller.navigate_live(0x401100);
        assert!(!f.controller.replay_history_entry(&mut state, &entry));
        assert_eq!(f.controller.mode(), Mode::Symbolicated);
    }

    #[test]
    fn test_raw_capture_outside_of_modules() {
        let mut f = fixture();
        let mut state = FakeState::new();

        // no module at this address
        f.controller.navigate(&mut state, 0x9000_0000);
        let entry = f.controller.capture_history_entry(&state).unwrap();
        assert_eq!(entry.payload, HistoryPayload::Live(0x9000_0000));

        f.controller.navigate_live(0x401100);
        assert!(f.controller.replay_history_entry(&mut state, &entry));
        assert_eq!(f.controller.mode(), Mode::Raw);
        assert_eq!(f.controller.current_offset(), 0x9000_0000);

        state.connected = false;
        f.controller.navigate_live(0x401100);
        assert!(!f.controller.replay_history_entry(&mut state, &entry));
        assert_eq!(f.controller.mode(), Mode::Symbolicated);
    }

    #[test]
    fn test_disconnected_raw_capture_falls_back_to_code() {
        let mut f = fixture();
        let mut state = FakeState::new();

        f.controller.navigate(&mut state, 0x1040);
        state.connected = false;
        let entry = f.controller.capture_history_entry(&state).unwrap();
        assert_eq!(entry.payload, HistoryPayload::Code(0x401100));
    }

    #[test]
    fn test_no_capture_while_replaying() {
        let mut f = fixture();
        let state = FakeState::new();
        f.controller.navigate_memory(0x1234);

        f.controller.replaying = true;
        assert!(f.controller.capture_history_entry(&state).is_none());
        assert_eq!(f.controller.memory_history_addr(), 0);

        f.controller.replaying = false;
        assert!(f.controller.capture_history_entry(&state).is_some());
        assert_eq!(f.controller.memory_history_addr(), 0x1234);
    }

    #[test]
    fn test_back_and_forward() {
        let mut f = fixture();
        let mut state = FakeState::new();

        f.controller.navigate(&mut state, 0x1040);
        f.controller.navigate(&mut state, 0x5000_1110);
        assert_eq!(f.controller.mode(), Mode::Symbolicated);

        assert!(f.controller.back(&mut state));
        assert_eq!(f.controller.mode(), Mode::Raw);
        assert_eq!(f.controller.current_offset(), 0x1040);

        assert!(f.controller.back(&mut state));
        assert_eq!(f.controller.mode(), Mode::Symbolicated);
        assert_eq!(f.symbolic.get(), 0x401100);
        assert!(!f.controller.back(&mut state));

        assert!(f.controller.forward(&mut state));
        assert_eq!(f.controller.current_offset(), 0x1040);
        assert!(f.controller.forward(&mut state));
        assert_eq!(f.symbolic.get(), 0x401110);
        assert!(!f.controller.forward(&mut state));
    }

    #[test]
    fn test_refresh_is_debounced() {
        let mut f = fixture();
        let mut state = FakeState::new();

        assert!(f.controller.on_timer_tick(&state));
        assert!(!f.controller.on_timer_tick(&state));

        let trigger = f.controller.refresh_trigger();
        let handle = std::thread::spawn(move || {
            trigger.request();
            trigger.request();
        });
        handle.join().unwrap();
        f.controller.notify_memory_changed();

        state.connected = false;
        assert!(f.controller.on_timer_tick(&state));
        assert_eq!(f.memory_pane.get(), 0);
        assert!(!f.controller.on_timer_tick(&state));
    }
}
