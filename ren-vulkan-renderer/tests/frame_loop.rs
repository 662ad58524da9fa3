use std::collections::VecDeque;

use ash::vk;
use pretty_assertions::assert_eq;
use ren_vulkan_renderer::{
    ClearColor, ErrorKind, FrameBackend, FrameLoop, FrameStage, LoopExit, RendererError, Result, WindowSystem,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Acquire(u32),
    Reset,
    Record(u32, ClearColor),
    Submit,
    Present(u32),
    Synchronize,
}

impl Call {
    fn stage(&self) -> FrameStage {
        match self {
            Call::Acquire(_) => FrameStage::Acquire,
            Call::Reset => FrameStage::Reset,
            Call::Record(..) => FrameStage::Record,
            Call::Submit => FrameStage::Submit,
            Call::Present(_) => FrameStage::Present,
            Call::Synchronize => FrameStage::Synchronize,
        }
    }
}

/// Records every call and hands out image indices from a script.
#[derive(Default)]
struct MockBackend {
    calls: Vec<Call>,
    image_indices: VecDeque<u32>,
    fail_present_on_frame: Option<usize>,
    presents: usize,
}

impl MockBackend {
    fn cycling(image_count: u32) -> Self {
        Self {
            image_indices: (0..image_count).cycle().take(64).collect(),
            ..Default::default()
        }
    }

    fn scripted(indices: &[u32]) -> Self {
        Self {
            image_indices: indices.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn acquires(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, Call::Acquire(_))).count()
    }
}

impl FrameBackend for MockBackend {
    fn acquire(&mut self) -> Result<u32> {
        let index = self.image_indices.pop_front().unwrap_or(0);
        self.calls.push(Call::Acquire(index));
        Ok(index)
    }

    fn reset(&mut self) -> Result<()> {
        self.calls.push(Call::Reset);
        Ok(())
    }

    fn record(&mut self, image_index: u32, clear: ClearColor) -> Result<()> {
        self.calls.push(Call::Record(image_index, clear));
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        self.calls.push(Call::Submit);
        Ok(())
    }

    fn present(&mut self, image_index: u32) -> Result<()> {
        if self.fail_present_on_frame == Some(self.presents) {
            return Err(RendererError::SwapchainOutOfDate);
        }
        self.presents += 1;
        self.calls.push(Call::Present(image_index));
        Ok(())
    }

    fn synchronize(&mut self) -> Result<()> {
        self.calls.push(Call::Synchronize);
        Ok(())
    }
}

/// Requests close once `close_after_polls` polls have happened.
struct ScriptedWindow {
    polls: usize,
    close_after_polls: Option<usize>,
}

impl ScriptedWindow {
    fn closing_after(polls: usize) -> Self {
        Self {
            polls: 0,
            close_after_polls: Some(polls),
        }
    }

    fn never_closing() -> Self {
        Self {
            polls: 0,
            close_after_polls: None,
        }
    }
}

impl WindowSystem for ScriptedWindow {
    fn poll_events(&mut self) {
        self.polls += 1;
    }

    fn close_requested(&self) -> bool {
        self.close_after_polls.is_some_and(|n| self.polls >= n)
    }

    fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: 800,
            height: 600,
        }
    }
}

#[test]
fn each_frame_runs_every_stage_in_order() {
    let mut window = ScriptedWindow::never_closing();
    let mut backend = MockBackend::cycling(3);
    let mut frame_loop = FrameLoop::new(ClearColor::default(), Some(4));

    let exit = frame_loop.run(&mut window, &mut backend).unwrap();
    assert_eq!(exit, LoopExit::FrameLimitReached { frames: 4 });
    assert_eq!(backend.calls.len(), 4 * FrameStage::ORDER.len());

    for frame in backend.calls.chunks(FrameStage::ORDER.len()) {
        let stages: Vec<FrameStage> = frame.iter().map(Call::stage).collect();
        assert_eq!(stages, FrameStage::ORDER.to_vec());
    }
}

#[test]
fn acquired_index_flows_to_record_and_present() {
    let mut window = ScriptedWindow::never_closing();
    let mut backend = MockBackend::scripted(&[2, 0, 1, 1]);
    let mut frame_loop = FrameLoop::new(ClearColor::default(), Some(4));

    frame_loop.run(&mut window, &mut backend).unwrap();

    for frame in backend.calls.chunks(FrameStage::ORDER.len()) {
        let Call::Acquire(acquired) = frame[0] else {
            panic!("frame did not start with an acquire: {:?}", frame);
        };
        assert!(matches!(frame[2], Call::Record(index, _) if index == acquired));
        assert_eq!(frame[4], Call::Present(acquired));
    }
    let presented: Vec<u32> = backend
        .calls
        .iter()
        .filter_map(|c| match c {
            Call::Present(index) => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(presented, vec![2, 0, 1, 1]);
}

#[test]
fn close_before_acquire_skips_the_frame() {
    let mut window = ScriptedWindow::closing_after(1);
    let mut backend = MockBackend::cycling(2);
    let mut frame_loop = FrameLoop::new(ClearColor::default(), None);

    let exit = frame_loop.run(&mut window, &mut backend).unwrap();
    assert_eq!(exit, LoopExit::CloseRequested { frames: 0 });
    assert_eq!(backend.acquires(), 0);
    assert!(backend.calls.is_empty());
}

#[test]
fn close_is_observed_only_between_frames() {
    let mut window = ScriptedWindow::closing_after(3);
    let mut backend = MockBackend::cycling(2);
    let mut frame_loop = FrameLoop::new(ClearColor::default(), None);

    let exit = frame_loop.run(&mut window, &mut backend).unwrap();
    assert_eq!(exit, LoopExit::CloseRequested { frames: 2 });
    assert_eq!(frame_loop.frames_rendered(), 2);
    assert_eq!(backend.calls.last(), Some(&Call::Synchronize));
}

#[test]
fn constant_clear_color_is_recorded_every_frame() {
    let clear = ClearColor([0.0, 0.25, 0.5, 1.0]);
    let mut window = ScriptedWindow::never_closing();
    let mut backend = MockBackend::cycling(3);
    let mut frame_loop = FrameLoop::new(clear, Some(5));

    frame_loop.run(&mut window, &mut backend).unwrap();

    let recorded: Vec<ClearColor> = backend
        .calls
        .iter()
        .filter_map(|c| match c {
            Call::Record(_, color) => Some(*color),
            _ => None,
        })
        .collect();
    assert_eq!(recorded, vec![clear; 5]);
}

#[test]
fn zero_frame_limit_renders_nothing() {
    let mut window = ScriptedWindow::never_closing();
    let mut backend = MockBackend::cycling(2);
    let mut frame_loop = FrameLoop::new(ClearColor::default(), Some(0));

    let exit = frame_loop.run(&mut window, &mut backend).unwrap();
    assert_eq!(exit.frames(), 0);
    assert!(backend.calls.is_empty());
}

#[test]
fn backend_error_aborts_the_loop() {
    let mut window = ScriptedWindow::never_closing();
    let mut backend = MockBackend {
        fail_present_on_frame: Some(1),
        ..MockBackend::cycling(2)
    };
    let mut frame_loop = FrameLoop::new(ClearColor::default(), None);

    let err = frame_loop.run(&mut window, &mut backend).unwrap_err();
    assert!(matches!(err, RendererError::SwapchainOutOfDate));
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert_eq!(frame_loop.frames_rendered(), 1);
    // The failing frame got as far as Submit and went no further.
    assert_eq!(backend.calls.last(), Some(&Call::Submit));
}
