use burn::module::{Module, Param};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder, RecorderError};
use burn::tensor::activation::{relu, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::action::{ACTION_COUNT, Action};
use crate::state::Observation;

pub const DEFAULT_INIT_SCALE: f32 = 0.25;

/// Two-layer feed-forward network mapping an observation to one value per
/// action. Read as logits by the policy-gradient learner and as Q-values by
/// the replay learner.
#[derive(Module, Debug)]
pub struct PolicyNetwork<B: Backend> {
    hidden: Linear<B>,
    output: Linear<B>,
}

/// Scalars of the hand-written temporal-difference update.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TdRule {
    pub learning_rate: f32,
    /// Extra factor on the input-layer deltas.
    pub hidden_damping: f32,
}

impl<B> PolicyNetwork<B>
where
    B: Backend,
    B::Device: Default,
{
    /// Weights are drawn uniformly from `±init_scale`, biases start at zero.
    pub fn new(input: usize, hidden: usize, init_scale: f32) -> Self {
        let device = B::Device::default();
        Self {
            hidden: init_layer(input, hidden, init_scale, &device),
            output: init_layer(hidden, ACTION_COUNT, init_scale, &device),
        }
    }

    pub fn input_size(&self) -> usize {
        self.hidden.weight.val().dims()[0]
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden.weight.val().dims()[1]
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let activations = relu(self.hidden.forward(input));
        self.output.forward(activations)
    }

    /// Raw outputs for a single observation.
    pub fn predict(&self, observation: &[f32]) -> Vec<f32> {
        tensor_values(self.forward(Self::observation_tensor(observation)))
    }

    /// Softmax of the outputs for a single observation.
    pub fn action_probabilities(&self, observation: &[f32]) -> Vec<f32> {
        let logits = self.forward(Self::observation_tensor(observation));
        tensor_values(softmax(logits, 1))
    }

    pub fn observation_tensor(observation: &[f32]) -> Tensor<B, 2> {
        Tensor::<B, 2>::from_data(
            TensorData::new(observation.to_vec(), [1, observation.len()]),
            &B::Device::default(),
        )
    }

    pub fn batch_tensor(observations: &[Observation]) -> Tensor<B, 2> {
        let width = observations.first().map(Vec::len).unwrap_or(0);
        let flat: Vec<f32> = observations.iter().flatten().copied().collect();
        Tensor::<B, 2>::from_data(
            TensorData::new(flat, [observations.len(), width]),
            &B::Device::default(),
        )
    }

    /// Nudges the network toward a scalar TD error for `action`.
    ///
    /// With `h = relu(x·W1 + b1)` and step `s = lr·error`:
    /// `W2[:, a] += s·h`, `b2[a] += s`, then
    /// `W1[i][j] += s·damping·W2[j][a]·[h_j > 0]·x_i` using the updated `W2`.
    /// `b1` is left as is.
    pub fn apply_td_error(self, observation: &[f32], action: Action, error: f32, rule: TdRule) -> Self {
        let device = B::Device::default();
        let hidden_size = self.hidden_size();
        let step = rule.learning_rate * error;

        let input = Self::observation_tensor(observation);
        let activations = relu(self.hidden.forward(input.clone()));
        let selector = one_hot::<B>(action, &device);

        let mut output = self.output;
        let output_delta = activations
            .clone()
            .transpose()
            .matmul(selector.clone())
            .mul_scalar(step);
        let output_weight = output.weight.val() + output_delta;
        output.weight = Param::from_tensor(output_weight.clone());
        if let Some(bias) = output.bias.take() {
            let bias_delta = selector.clone().reshape([ACTION_COUNT]).mul_scalar(step);
            output.bias = Some(Param::from_tensor(bias.val() + bias_delta));
        }

        let column = output_weight
            .matmul(selector.transpose())
            .reshape([1, hidden_size]);
        let mask = activations.greater_elem(0.0).float();
        let hidden_error = (column * mask).mul_scalar(step * rule.hidden_damping);
        let mut hidden = self.hidden;
        let hidden_delta = input.transpose().matmul(hidden_error);
        hidden.weight = Param::from_tensor(hidden.weight.val() + hidden_delta);

        Self { hidden, output }
    }

    /// Serializes the parameters with burn's binary recorder.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecorderError> {
        BinBytesRecorder::<FullPrecisionSettings>::new().record(self.clone().into_record(), ())
    }

    /// Replaces the parameters with ones produced by [`Self::to_bytes`].
    pub fn load_bytes(self, bytes: Vec<u8>) -> Result<Self, RecorderError> {
        let device = B::Device::default();
        let record = BinBytesRecorder::<FullPrecisionSettings>::new()
            .load::<<Self as Module<B>>::Record>(bytes, &device)?;
        Ok(self.load_record(record))
    }
}

fn init_layer<B: Backend>(input: usize, output: usize, scale: f32, device: &B::Device) -> Linear<B> {
    let scale = f64::from(scale);
    let mut layer = LinearConfig::new(input, output)
        .with_initializer(Initializer::Uniform {
            min: -scale,
            max: scale,
        })
        .init(device);
    layer.bias = Some(Param::from_tensor(Tensor::zeros([output], device)));
    layer
}

fn one_hot<B: Backend>(action: Action, device: &B::Device) -> Tensor<B, 2> {
    let mut values = [0.0f32; ACTION_COUNT];
    values[action.index()] = 1.0;
    Tensor::<B, 2>::from_data(TensorData::new(values.to_vec(), [1, ACTION_COUNT]), device)
}

pub(crate) fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().to_vec::<f32>().unwrap_or_default()
}
